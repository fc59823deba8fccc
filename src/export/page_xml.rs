//! PAGE XML (PcGts) serializer: nested region layout.
//!
//! Unlike ALTO, PAGE XML permits arbitrary region nesting, so the renderer
//! walks the tree top-down: structural nodes become `TextRegion` elements
//! that recurse, lines become `TextLine` elements, and word-level children
//! become `Word` elements inside their line.

use crate::core::errors::{QuireError, QuireResult};
use crate::export::xml::{self, Tag, xmlescape};
use crate::export::{ExportMetadata, Serializer};
use crate::tree::node::NodeId;
use crate::tree::page::Page;

const SCHEMA_NS: &str = "http://schema.primaresearch.org/PAGE/gts/pagecontent/2019-07-15";

/// The PAGE XML serializer, schema version 2019-07-15.
#[derive(Debug, Clone, Default)]
pub struct PageXml;

impl PageXml {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for PageXml {
    fn format_name(&self) -> &'static str {
        "page"
    }

    fn extension(&self) -> &'static str {
        ".xml"
    }

    fn serialize(&self, page: &Page, metadata: &ExportMetadata) -> QuireResult<String> {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<PcGts xmlns=\"{SCHEMA_NS}\"\n       \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n       \
             xsi:schemaLocation=\"{SCHEMA_NS} {SCHEMA_NS}/pagecontent.xsd\">\n"
        ));
        out.push_str("  <Metadata>\n");
        out.push_str(&format!(
            "    <Creator>{}</Creator>\n",
            xmlescape(&metadata.creator)
        ));
        out.push_str(&format!(
            "    <Created>{}</Created>\n",
            metadata.created_rfc3339()
        ));
        out.push_str(&format!(
            "    <LastChange>{}</LastChange>\n",
            metadata.last_change_rfc3339()
        ));
        out.push_str("  </Metadata>\n");

        let root = page.root();
        let file_name = root
            .get("file_name")
            .and_then(crate::domain::prediction::Property::as_str)
            .unwrap_or("");
        out.push_str(&format!(
            "  <Page imageFilename=\"{}\" imageWidth=\"{}\" imageHeight=\"{}\">\n",
            xmlescape(file_name),
            root.width(),
            root.height()
        ));
        for &child in root.children() {
            render_node(&mut out, page, child, 4);
        }
        out.push_str("  </Page>\n");
        out.push_str("</PcGts>\n");
        Ok(out)
    }

    fn validate(&self, document: &str) -> QuireResult<()> {
        let tags = xml::scan(document, "page")?;
        match tags.first() {
            Some(tag) if tag.name() == "PcGts" => {}
            _ => {
                return Err(QuireError::schema_violation(
                    "page",
                    "root element must be <PcGts>",
                ));
            }
        }
        for required in ["Metadata", "Creator", "Created", "LastChange", "Page"] {
            if !tags.iter().any(|tag| tag.name() == required) {
                return Err(QuireError::schema_violation(
                    "page",
                    format!("required element <{required}> is missing"),
                ));
            }
        }
        // Every region, line and word must carry a Coords child.
        let mut stack: Vec<(&str, bool)> = Vec::new();
        for tag in &tags {
            match tag {
                Tag::Open(name) => stack.push((name.as_str(), false)),
                Tag::Empty(name) => {
                    if name == "Coords" {
                        if let Some(top) = stack.last_mut() {
                            top.1 = true;
                        }
                    }
                }
                Tag::Close(name) => {
                    let Some((_, saw_coords)) = stack.pop() else {
                        continue;
                    };
                    if matches!(name.as_str(), "TextRegion" | "TextLine" | "Word") && !saw_coords {
                        return Err(QuireError::schema_violation(
                            "page",
                            format!("<{name}> is missing its <Coords> child"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn render_node(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    if page.is_line(id) {
        render_line(out, page, id, indent);
    } else {
        render_region(out, page, id, indent);
    }
}

fn render_region(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let node = page.node(id);
    let pad = " ".repeat(indent);
    let custom = node
        .class_label()
        .map(|class| format!(" custom=\"structure {{type:{};}}\"", xmlescape(class)))
        .unwrap_or_default();
    out.push_str(&format!(
        "{pad}<TextRegion id=\"{}\"{custom}>\n",
        xmlescape(node.label())
    ));
    render_coords(out, page, id, indent + 2);
    for &child in node.children() {
        render_node(out, page, child, indent + 2);
    }
    out.push_str(&format!("{pad}</TextRegion>\n"));
}

fn render_line(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let node = page.node(id);
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}<TextLine id=\"{}\">\n",
        xmlescape(node.label())
    ));
    render_coords(out, page, id, indent + 2);
    for &child in node.children() {
        if page.is_word(child) {
            render_word(out, page, child, indent + 2);
        }
    }
    render_text_equiv(out, page, id, indent + 2);
    out.push_str(&format!("{pad}</TextLine>\n"));
}

fn render_word(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let node = page.node(id);
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}<Word id=\"{}\">\n", xmlescape(node.label())));
    render_coords(out, page, id, indent + 2);
    render_text_equiv(out, page, id, indent + 2);
    out.push_str(&format!("{pad}</Word>\n"));
}

fn render_coords(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}<Coords points=\"{}\"/>\n",
        page.node(id).polygon()
    ));
}

fn render_text_equiv(out: &mut String, page: &Page, id: NodeId, indent: usize) {
    let node = page.node(id);
    let Some(text) = node.text() else {
        return;
    };
    let pad = " ".repeat(indent);
    let confidence = node
        .text_result()
        .and_then(|t| t.top_score())
        .map(|score| format!(" conf=\"{score:.4}\""))
        .unwrap_or_default();
    out.push_str(&format!(
        "{pad}<TextEquiv{confidence}>\n{pad}  <Unicode>{}</Unicode>\n{pad}</TextEquiv>\n",
        xmlescape(text)
    ));
}
