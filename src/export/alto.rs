//! ALTO v4 serializer: flat region layout.
//!
//! ALTO forbids nested blocks, so the renderer does not walk the tree
//! top-down. Instead it collects every node that qualifies as a *text
//! block* (a region whose children all carry text, i.e. are lines) wherever
//! it sits in the tree, and renders those blocks flat inside the page's
//! `PrintSpace` or margin groups. Structural nodes above a block are
//! flattened away; block qualification is recomputed per node, never
//! inherited.

use crate::core::errors::{QuireError, QuireResult};
use crate::domain::prediction::Property;
use crate::export::xml::{self, Tag, xmlescape};
use crate::export::{ExportMetadata, Serializer};
use crate::tree::node::{Node, NodeId};
use crate::tree::page::Page;

/// Annotation key for a block's page location.
pub const REGION_LOCATION_KEY: &str = "region_location";

/// Where on the page a text block is rendered.
///
/// Set by a layout analysis step as a [`Property::Str`] under
/// [`REGION_LOCATION_KEY`]; unknown or missing values fall back to the
/// print space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionLocation {
    PrintSpace,
    MarginTop,
    MarginBottom,
    MarginLeft,
    MarginRight,
}

impl RegionLocation {
    fn parse(value: &str) -> Self {
        match value {
            "margin_top" => Self::MarginTop,
            "margin_bottom" => Self::MarginBottom,
            "margin_left" => Self::MarginLeft,
            "margin_right" => Self::MarginRight,
            _ => Self::PrintSpace,
        }
    }
}

/// The ALTO v4 serializer.
#[derive(Debug, Clone, Default)]
pub struct Alto;

impl Alto {
    pub fn new() -> Self {
        Self
    }
}

/// True iff the node has children and all of them carry text.
///
/// Such a node maps to an ALTO `TextBlock`: its children are lines (the
/// node itself has no text, so a text-bearing child is a line by
/// definition). A node whose children are further structural regions does
/// not qualify and is flattened instead.
pub fn is_text_block(page: &Page, id: NodeId) -> bool {
    page.is_region(id)
        && page
            .node(id)
            .children()
            .iter()
            .all(|&child| page.node(child).has_text())
}

impl Serializer for Alto {
    fn format_name(&self) -> &'static str {
        "alto"
    }

    fn extension(&self) -> &'static str {
        ".xml"
    }

    fn serialize(&self, page: &Page, metadata: &ExportMetadata) -> QuireResult<String> {
        let mut printspace = Vec::new();
        let mut margin_top = Vec::new();
        let mut margin_bottom = Vec::new();
        let mut margin_left = Vec::new();
        let mut margin_right = Vec::new();
        for id in page.traverse() {
            if !is_text_block(page, id) {
                continue;
            }
            let location = page
                .node(id)
                .get(REGION_LOCATION_KEY)
                .and_then(Property::as_str)
                .map(RegionLocation::parse)
                .unwrap_or(RegionLocation::PrintSpace);
            match location {
                RegionLocation::PrintSpace => printspace.push(id),
                RegionLocation::MarginTop => margin_top.push(id),
                RegionLocation::MarginBottom => margin_bottom.push(id),
                RegionLocation::MarginLeft => margin_left.push(id),
                RegionLocation::MarginRight => margin_right.push(id),
            }
        }

        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<alto xmlns=\"http://www.loc.gov/standards/alto/ns-v4#\"\n");
        out.push_str("      xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n");
        out.push_str(
            "      xsi:schemaLocation=\"http://www.loc.gov/standards/alto/ns-v4# \
             http://www.loc.gov/standards/alto/v4/alto-4-4.xsd\">\n",
        );
        render_description(&mut out, page, metadata);

        out.push_str("  <Layout>\n");
        let root = page.root();
        out.push_str(&format!(
            "    <Page ID=\"{}\" WIDTH=\"{}\" HEIGHT=\"{}\" PHYSICAL_IMG_NR=\"0\"",
            xmlescape(root.label()),
            root.width(),
            root.height()
        ));
        if let Some(confidence) = page.average_text_confidence() {
            out.push_str(&format!(" PC=\"{confidence:.4}\""));
        }
        out.push_str(">\n");

        render_margin(&mut out, page, "TopMargin", &margin_top);
        render_margin(&mut out, page, "LeftMargin", &margin_left);
        render_margin(&mut out, page, "RightMargin", &margin_right);
        render_margin(&mut out, page, "BottomMargin", &margin_bottom);

        out.push_str(&format!(
            "      <PrintSpace HPOS=\"0\" VPOS=\"0\" WIDTH=\"{}\" HEIGHT=\"{}\">\n",
            root.width(),
            root.height()
        ));
        for &id in &printspace {
            render_block(&mut out, page, id, 8);
        }
        out.push_str("      </PrintSpace>\n");
        out.push_str("    </Page>\n");
        out.push_str("  </Layout>\n");
        out.push_str("</alto>\n");
        Ok(out)
    }

    fn validate(&self, document: &str) -> QuireResult<()> {
        let tags = xml::scan(document, "alto")?;
        match tags.first() {
            Some(tag) if tag.name() == "alto" => {}
            _ => {
                return Err(QuireError::schema_violation(
                    "alto",
                    "root element must be <alto>",
                ));
            }
        }
        for required in ["Description", "Layout", "Page"] {
            if !tags.iter().any(|tag| tag.name() == required) {
                return Err(QuireError::schema_violation(
                    "alto",
                    format!("required element <{required}> is missing"),
                ));
            }
        }
        // The flat-nesting constraint: no TextBlock inside another.
        let mut depth = 0usize;
        for tag in &tags {
            match tag {
                Tag::Open(name) | Tag::Empty(name) if name == "TextBlock" => {
                    if depth > 0 {
                        return Err(QuireError::schema_violation(
                            "alto",
                            "nested <TextBlock> elements are not allowed",
                        ));
                    }
                    if matches!(tag, Tag::Open(_)) {
                        depth += 1;
                    }
                }
                Tag::Close(name) if name == "TextBlock" => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

fn render_description(out: &mut String, page: &Page, metadata: &ExportMetadata) {
    out.push_str("  <Description>\n");
    out.push_str("    <MeasurementUnit>pixel</MeasurementUnit>\n");
    if let Some(file_name) = page.root().get("file_name").and_then(Property::as_str) {
        out.push_str("    <sourceImageInformation>\n");
        out.push_str(&format!(
            "      <fileName>{}</fileName>\n",
            xmlescape(file_name)
        ));
        out.push_str("    </sourceImageInformation>\n");
    }
    for (index, step) in metadata.processing_steps.iter().enumerate() {
        out.push_str(&format!("    <Processing ID=\"step{index}\">\n"));
        out.push_str(&format!(
            "      <processingDateTime>{}</processingDateTime>\n",
            metadata.created_rfc3339()
        ));
        out.push_str(&format!(
            "      <processingStepDescription>{}</processingStepDescription>\n",
            xmlescape(step)
        ));
        out.push_str("    </Processing>\n");
    }
    out.push_str(&format!(
        "    <Processing ID=\"step{}\">\n",
        metadata.processing_steps.len()
    ));
    out.push_str(&format!(
        "      <processingDateTime>{}</processingDateTime>\n",
        metadata.last_change_rfc3339()
    ));
    out.push_str("      <processingSoftware>\n");
    out.push_str(&format!(
        "        <softwareCreator>{}</softwareCreator>\n",
        xmlescape(&metadata.creator)
    ));
    out.push_str(&format!(
        "        <softwareName>{}</softwareName>\n",
        xmlescape(&metadata.software_name)
    ));
    out.push_str(&format!(
        "        <softwareVersion>{}</softwareVersion>\n",
        xmlescape(&metadata.software_version)
    ));
    out.push_str(&format!(
        "        <applicationDescription>{}</applicationDescription>\n",
        xmlescape(&metadata.application_description)
    ));
    out.push_str("      </processingSoftware>\n");
    out.push_str("    </Processing>\n");
    out.push_str("  </Description>\n");
}

fn render_margin(out: &mut String, page: &Page, element: &str, blocks: &[NodeId]) {
    if blocks.is_empty() {
        return;
    }
    out.push_str(&format!("      <{element}>\n"));
    for &id in blocks {
        render_block(out, page, id, 8);
    }
    out.push_str(&format!("      </{element}>\n"));
}

fn render_block(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let node = page.node(id);
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}<TextBlock ID=\"{}\"{}>\n",
        xmlescape(node.label()),
        position_attrs(node)
    ));
    render_shape(out, node, indent + 2);
    for &line in node.children() {
        render_line(out, page, line, indent + 2);
    }
    out.push_str(&format!("{pad}</TextBlock>\n"));
}

fn render_line(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let node = page.node(id);
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}<TextLine ID=\"{}\"{}>\n",
        xmlescape(node.label()),
        position_attrs(node)
    ));
    render_shape(out, node, indent + 2);

    // Word-level children each become a String; otherwise the whole line is
    // one String.
    let words: Vec<NodeId> = node
        .children()
        .iter()
        .copied()
        .filter(|&word| page.node(word).has_text())
        .collect();
    if words.is_empty() {
        render_string(out, node, indent + 2);
    } else {
        for word in words {
            render_string(out, page.node(word), indent + 2);
        }
    }
    out.push_str(&format!("{pad}</TextLine>\n"));
}

fn render_string(out: &mut String, node: &Node, indent: usize) {
    let Some(text) = node.text() else {
        return;
    };
    let pad = " ".repeat(indent);
    let confidence = node
        .text_result()
        .and_then(|t| t.top_score())
        .map(|score| format!(" WC=\"{score:.4}\""))
        .unwrap_or_default();
    out.push_str(&format!(
        "{pad}<String CONTENT=\"{}\"{}{confidence}/>\n",
        xmlescape(text),
        position_attrs(node)
    ));
}

fn render_shape(out: &mut String, node: &Node, indent: usize) {
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}<Shape><Polygon POINTS=\"{}\"/></Shape>\n",
        node.polygon()
    ));
}

fn position_attrs(node: &Node) -> String {
    let bbox = node.bbox();
    format!(
        " HPOS=\"{}\" VPOS=\"{}\" WIDTH=\"{}\" HEIGHT=\"{}\"",
        bbox.x1(),
        bbox.y1(),
        node.width(),
        node.height()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Bbox;
    use crate::domain::prediction::{Prediction, RecognizedText};
    use crate::domain::segment::Segment;

    fn segment_at(x: i32, y: i32, w: i32, h: i32) -> Segment {
        Segment::from_bbox(Bbox::new(x, y, x + w, y + h))
    }

    /// page -> region -> 2 lines with text.
    fn segmented_page() -> Page {
        let mut page = Page::synthetic("p1", 200, 300);
        let regions = page.create_segments(page.root_id(), vec![segment_at(10, 10, 200, 100)]);
        let lines = page.create_segments(
            regions[0],
            vec![segment_at(0, 0, 180, 40), segment_at(0, 50, 180, 40)],
        );
        page.update(
            lines[0],
            Prediction::recognition(RecognizedText::single("first line", 0.9)),
        );
        page.update(
            lines[1],
            Prediction::recognition(RecognizedText::single("second line", 0.7)),
        );
        page
    }

    #[test]
    fn block_predicate_requires_all_text_children() {
        let page = segmented_page();
        let region = page.root().children()[0];
        assert!(is_text_block(&page, region));
        // The page root's child is a region, not a line.
        assert!(!is_text_block(&page, page.root_id()));
        // Lines themselves are not blocks.
        let line = page.node(region).children()[0];
        assert!(!is_text_block(&page, line));
    }

    #[test]
    fn block_predicate_is_recomputed_not_inherited() {
        let mut page = segmented_page();
        let region = page.root().children()[0];
        // Subdivide one line into a sub-region: the region's children are no
        // longer all text-bearing, so it stops being a block.
        let line = page.node(region).children()[0];
        page.create_segments(line, vec![segment_at(0, 0, 20, 20)]);
        assert!(!is_text_block(&page, region));
    }

    #[test]
    fn serialize_renders_blocks_inside_printspace() {
        let page = segmented_page();
        let doc = Alto::new()
            .serialize(&page, &ExportMetadata::default())
            .unwrap();
        assert!(doc.contains("<PrintSpace"));
        assert!(doc.contains("<TextBlock ID=\"p1_node1\""));
        assert!(doc.contains("CONTENT=\"first line\""));
        assert!(doc.contains("WC=\"0.9000\""));
        // Page confidence is the mean of 0.9 and 0.7.
        assert!(doc.contains("PC=\"0.8000\""));
        Alto::new().validate(&doc).unwrap();
    }

    #[test]
    fn region_location_routes_blocks_into_margins() {
        let mut page = segmented_page();
        let region = page.root().children()[0];
        page.node_mut(region)
            .add_data(REGION_LOCATION_KEY, "margin_top");
        let doc = Alto::new()
            .serialize(&page, &ExportMetadata::default())
            .unwrap();
        assert!(doc.contains("<TopMargin>"));
        let printspace = doc.split("<PrintSpace").nth(1).unwrap();
        assert!(!printspace.contains("<TextBlock"));
    }

    #[test]
    fn deep_trees_are_flattened_to_innermost_blocks() {
        // page -> outer region -> inner region -> line: only the inner
        // region qualifies as a block.
        let mut page = Page::synthetic("p", 200, 200);
        let outer = page.create_segments(page.root_id(), vec![segment_at(0, 0, 150, 150)]);
        let inner = page.create_segments(outer[0], vec![segment_at(10, 10, 100, 100)]);
        let lines = page.create_segments(inner[0], vec![segment_at(0, 0, 80, 20)]);
        page.update(
            lines[0],
            Prediction::recognition(RecognizedText::single("deep", 0.8)),
        );

        assert!(!is_text_block(&page, outer[0]));
        assert!(is_text_block(&page, inner[0]));
        let doc = Alto::new()
            .serialize(&page, &ExportMetadata::default())
            .unwrap();
        assert_eq!(doc.matches("<TextBlock").count(), 1);
        Alto::new().validate(&doc).unwrap();
    }

    #[test]
    fn word_level_children_become_separate_strings() {
        let mut page = segmented_page();
        let region = page.root().children()[0];
        let line = page.node(region).children()[0];
        let words = page.create_segments(
            line,
            vec![segment_at(0, 0, 40, 40), segment_at(50, 0, 40, 40)],
        );
        for (word, text) in words.into_iter().zip(["first", "line"]) {
            page.update(
                word,
                Prediction::recognition(RecognizedText::single(text, 0.95)),
            );
        }
        let doc = Alto::new()
            .serialize(&page, &ExportMetadata::default())
            .unwrap();
        assert!(doc.contains("CONTENT=\"first\""));
        assert!(doc.contains("CONTENT=\"line\""));
    }

    #[test]
    fn validate_rejects_nested_blocks() {
        let doc = "<alto><Description/><Layout><Page>\
                   <TextBlock><TextBlock/></TextBlock>\
                   </Page></Layout></alto>";
        let err = Alto::new().validate(doc).unwrap_err();
        assert!(err.to_string().contains("nested <TextBlock>"));
    }

    #[test]
    fn validate_requires_layout_elements() {
        let err = Alto::new().validate("<alto><Description/></alto>").unwrap_err();
        assert!(err.to_string().contains("<Layout>"));
        let err = Alto::new().validate("<other/>").unwrap_err();
        assert!(err.to_string().contains("root element"));
    }

    #[test]
    fn metadata_lands_in_the_description_block() {
        let page = segmented_page();
        let metadata = ExportMetadata::default().with_processing_step("line segmentation");
        let doc = Alto::new().serialize(&page, &metadata).unwrap();
        assert!(doc.contains("<MeasurementUnit>pixel</MeasurementUnit>"));
        assert!(doc.contains("line segmentation"));
        assert!(doc.contains("<softwareName>quire</softwareName>"));
    }
}
