//! One page's document tree.
//!
//! A [`Page`] owns an arena of nodes; index 0 is always the page root. All
//! mutation goes through the page so the coordinate-frame and depth
//! invariants hold after every operation: coordinates and polygons are
//! absolute in the root frame, children sit exactly one level below their
//! parent, and the pixel cache is kept coherent with the geometry.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::core::config::LabelFormat;
use crate::core::errors::{QuireError, QuireResult};
use crate::domain::geometry::{self, Bbox, Point, Polygon, mask_to_polygon};
use crate::domain::prediction::{Prediction, Property};
use crate::domain::segment::Segment;
use crate::tree::node::{Node, NodeId, NodeKind};
use crate::utils::image as imgutil;

/// A page tree: the root node backed by a source image file plus every
/// region analysis has carved out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    nodes: Vec<Node>,
}

impl Page {
    /// Opens a page for the given image file.
    ///
    /// Only the image header is read: dimensions are probed without decoding
    /// pixel data, which stays on disk until the page image is first
    /// requested.
    ///
    /// # Returns
    ///
    /// * `Ok(Page)` - A single-node tree labeled after the file stem.
    /// * `Err(QuireError::ImageLoad)` - If the file is unreadable or not an image.
    pub fn open(path: impl AsRef<Path>) -> QuireResult<Self> {
        let path = path.as_ref();
        let (height, width) = imgutil::image_size(path)?;
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut root = Node {
            height,
            width,
            coord: Point::default(),
            polygon: Bbox::from_size(width, height).polygon(),
            mask: None,
            parent: None,
            children: Vec::new(),
            depth: 0,
            label: label.clone(),
            data: HashMap::new(),
            image: None,
            kind: NodeKind::Page {
                path: path.to_path_buf(),
                original_size: (height, width),
                ratio: 1.0,
            },
        };
        root.add_data("file_name", file_name);
        root.add_data("image_path", path.display().to_string());
        root.add_data("image_name", label);
        Ok(Self { nodes: vec![root] })
    }

    /// Id of the page root.
    #[inline]
    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    /// The page root node.
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Borrows a node by id.
    ///
    /// Ids come from this page's own traversal and attachment methods;
    /// passing an id from another page is a logic error and panics.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// The page label (the source file stem until relabeled).
    pub fn label(&self) -> &str {
        self.root().label()
    }

    pub fn height(&self) -> u32 {
        self.root().height()
    }

    pub fn width(&self) -> u32 {
        self.root().width()
    }

    /// Source dimensions as `(height, width)`, fixed when the page was
    /// opened.
    pub fn original_size(&self) -> Option<(u32, u32)> {
        match self.root().kind() {
            NodeKind::Page { original_size, .. } => Some(*original_size),
            NodeKind::Segment { .. } => None,
        }
    }

    /// Every node reachable from the root, depth-first, document order.
    pub fn traverse(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root_id()];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.nodes[id.0].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Leaves in document order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.traverse()
            .into_iter()
            .filter(|id| self.nodes[id.0].is_leaf())
            .collect()
    }

    /// Line nodes (text-bearing, parent without text) in document order.
    pub fn lines(&self) -> Vec<NodeId> {
        self.traverse()
            .into_iter()
            .filter(|&id| self.is_line(id))
            .collect()
    }

    /// Maximum depth over the whole tree; a bare page is 0.
    pub fn max_depth(&self) -> usize {
        self.traverse()
            .into_iter()
            .map(|id| self.nodes[id.0].depth)
            .max()
            .unwrap_or(0)
    }

    /// True if the node carries text and its parent does not.
    pub fn is_line(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        node.has_text()
            && match node.parent {
                Some(parent) => !self.nodes[parent.0].has_text(),
                None => true,
            }
    }

    /// True if the node carries text and its parent is a line.
    pub fn is_word(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        node.has_text()
            && match node.parent {
                Some(parent) => self.is_line(parent),
                None => false,
            }
    }

    /// True if the node has children and no text of its own.
    pub fn is_region(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        !node.children.is_empty() && !node.has_text()
    }

    /// True if the node or any of its descendants carries text.
    pub fn subtree_contains_text(&self, id: NodeId) -> bool {
        if self.nodes[id.0].has_text() {
            return true;
        }
        self.nodes[id.0]
            .children
            .iter()
            .any(|&child| self.subtree_contains_text(child))
    }

    /// True if any node on the page carries text.
    pub fn contains_text(&self) -> bool {
        self.subtree_contains_text(self.root_id())
    }

    /// Replaces `id`'s children with one node per segment, discarding any
    /// previous subtree.
    ///
    /// The node's own cached image is cleared: once subdivided it is no
    /// longer a terminal image producer. Returns the new children in
    /// segment order.
    ///
    /// New children get a provisional label (parent label plus a
    /// default-format suffix); a relabel pass with the configured
    /// [`LabelFormat`] assigns the final labels. Callers going through
    /// [`crate::tree::Collection::update`] get that pass automatically;
    /// callers driving a page directly should call [`Page::relabel`]
    /// before reading labels.
    pub fn create_segments(&mut self, id: NodeId, segments: Vec<Segment>) -> Vec<NodeId> {
        let old = std::mem::take(&mut self.nodes[id.0].children);
        for stale in old {
            self.drop_subtree_images(stale);
        }
        self.nodes[id.0].image = None;
        debug!(
            label = %self.nodes[id.0].label,
            count = segments.len(),
            "replacing children from segments"
        );
        segments
            .into_iter()
            .map(|segment| self.attach_segment(id, segment))
            .collect()
    }

    /// Applies one analyzer prediction to a node: subdivide if it carries
    /// segments, then merge its annotation data.
    pub fn update(&mut self, id: NodeId, prediction: Prediction) {
        let Prediction { segments, data } = prediction;
        if !segments.is_empty() {
            self.create_segments(id, segments);
        }
        self.nodes[id.0].data.extend(data);
    }

    /// Attaches one segment as a child of `parent`.
    ///
    /// The segment's bbox is interpreted in the parent's local frame; the
    /// node's absolute position and polygon are fixed here, at construction.
    /// The label is provisional (default format) until the next relabel
    /// pass.
    pub(crate) fn attach_segment(&mut self, parent: NodeId, segment: Segment) -> NodeId {
        let Segment {
            bbox: local_bbox,
            polygon,
            mask,
            score,
            class_label,
            data,
        } = segment;

        let parent_node = &self.nodes[parent.0];
        let coord = parent_node.coord + local_bbox.p1();
        let width = local_bbox.width();
        let height = local_bbox.height();
        let bbox = Bbox::from_size(width, height).move_by(coord);
        let depth = parent_node.depth + 1;
        let resolved = self.resolve_polygon(parent, &bbox, polygon, coord);

        let parent_label = self.nodes[parent.0].label.clone();
        let index = self.nodes[parent.0].children.len() + 1;
        let label =
            LabelFormat::default().child_label(&parent_label, class_label.as_deref(), index);

        let node = Node {
            height,
            width,
            coord,
            polygon: resolved,
            mask,
            parent: Some(parent),
            children: Vec::new(),
            depth,
            label,
            data: data
                .into_iter()
                .map(|(key, value)| (key, Property::Json(value)))
                .collect(),
            image: None,
            kind: NodeKind::Segment {
                bbox: local_bbox,
                class_label,
                score,
            },
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Picks the most specific outline available: explicit polygon, then a
    /// shape cut from the parent's mask, then the bbox corners.
    fn resolve_polygon(
        &self,
        parent: NodeId,
        bbox: &Bbox,
        explicit: Option<Polygon>,
        coord: Point,
    ) -> Polygon {
        let parent_node = &self.nodes[parent.0];
        if let Some(polygon) = explicit {
            return polygon.move_by(parent_node.coord);
        }
        if let Some(parent_mask) = &parent_node.mask {
            let local = bbox.move_by(-parent_node.coord);
            let cropped = parent_mask.crop(&local);
            if cropped.any() {
                return mask_to_polygon(&cropped).move_by(coord);
            }
        }
        bbox.polygon()
    }

    /// Scales the whole tree by `ratio`: sizes, coordinates, polygons,
    /// masks, segment payloads and any cached images, uniformly.
    pub fn rescale(&mut self, ratio: f64) {
        if ratio == 1.0 {
            return;
        }
        for id in self.traverse() {
            self.rescale_node(id, ratio);
        }
    }

    fn rescale_node(&mut self, id: NodeId, ratio: f64) {
        let node = &mut self.nodes[id.0];
        node.height = geometry::scale_dimension(node.height, ratio);
        node.width = geometry::scale_dimension(node.width, ratio);
        node.coord = node.coord.rescale(ratio);
        node.polygon = node.polygon.rescale(ratio);
        node.mask = node.mask.as_ref().map(|mask| mask.rescale(ratio));
        match &mut node.kind {
            NodeKind::Page {
                original_size,
                ratio: page_ratio,
                ..
            } => {
                *page_ratio = node.width as f64 / original_size.1.max(1) as f64;
            }
            NodeKind::Segment { bbox, .. } => {
                *bbox = bbox.rescale(ratio);
            }
        }
        if let Some(img) = node.image.take() {
            node.image = Some(imgutil::rescale(&img, ratio));
        }
    }

    /// Downscales the page to fit within `max_height` x `max_width`,
    /// preserving aspect ratio. Pages already within the bounds are left
    /// unchanged.
    pub fn set_size(&mut self, max_height: u32, max_width: u32) {
        if max_height == 0 || max_width == 0 {
            return;
        }
        let height = self.height() as f64;
        let width = self.width() as f64;
        if height == 0.0 || width == 0.0 {
            return;
        }
        let ratio = 1.0 / (width / max_width as f64).max(height / max_height as f64);
        if ratio < 1.0 {
            self.rescale(ratio);
        }
    }

    /// Rescales the page back to its source dimensions.
    pub fn to_original_size(&mut self) {
        if let Some((_, original_width)) = self.original_size() {
            let width = self.width();
            if width > 0 && width != original_width {
                self.rescale(original_width as f64 / width as f64);
            }
        }
    }

    /// The node's pixel image, materializing it (and any unmaterialized
    /// ancestors) on first access.
    ///
    /// The page root decodes its source file and rescales it to the current
    /// size; segment nodes crop their parent's image and background-fill
    /// outside their mask. Results are cached per node.
    pub fn image(&mut self, id: NodeId) -> QuireResult<&RgbImage> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(link) = cursor {
            chain.push(link);
            cursor = self.nodes[link.0].parent;
        }
        chain.reverse();

        for &link in &chain {
            if self.nodes[link.0].image.is_some() {
                continue;
            }
            let generated = self.generate_image(link)?;
            self.nodes[link.0].image = Some(generated);
        }
        self.nodes[id.0]
            .image
            .as_ref()
            .ok_or_else(|| QuireError::invalid_input("image cache unexpectedly empty"))
    }

    fn generate_image(&self, id: NodeId) -> QuireResult<RgbImage> {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Page {
                path,
                original_size,
                ..
            } => {
                let img = imgutil::load_image(path)?;
                let ratio = node.width as f64 / original_size.1.max(1) as f64;
                debug!(label = %node.label, ratio, "materialized page image");
                if (ratio - 1.0).abs() < f64::EPSILON {
                    Ok(img)
                } else {
                    Ok(imgutil::rescale(&img, ratio))
                }
            }
            NodeKind::Segment { bbox, .. } => {
                let parent = node
                    .parent
                    .ok_or_else(|| QuireError::invalid_input("segment node has no parent"))?;
                let parent_img = self.nodes[parent.0].image.as_ref().ok_or_else(|| {
                    QuireError::invalid_input("parent image not materialized before child crop")
                })?;
                let cropped = imgutil::crop(parent_img, bbox)?;
                Ok(match &node.mask {
                    Some(mask) => imgutil::apply_mask(&cropped, mask),
                    None => cropped,
                })
            }
        }
    }

    /// Frees every cached image on the page, detached slots included.
    pub fn clear_images(&mut self) {
        for node in &mut self.nodes {
            node.image = None;
        }
        debug!(label = %self.nodes[0].label, "cleared cached images");
    }

    fn drop_subtree_images(&mut self, id: NodeId) {
        self.nodes[id.0].image = None;
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.drop_subtree_images(child);
        }
    }

    /// Reassigns every descendant's label from its parent's label plus a
    /// positional suffix, depth-first. The root label is left alone.
    pub fn relabel(&mut self, format: &LabelFormat) {
        for id in self.traverse() {
            let parent_label = self.nodes[id.0].label.clone();
            let children = self.nodes[id.0].children.clone();
            let mut counters: HashMap<String, usize> = HashMap::new();
            for child in children {
                let class = self.nodes[child.0].class_label().map(str::to_string);
                let group = match (format.use_class_labels, class.as_deref()) {
                    (true, Some(c)) => c.to_string(),
                    _ => LabelFormat::FALLBACK_STEM.to_string(),
                };
                let index = counters.entry(group).or_insert(0);
                *index += 1;
                self.nodes[child.0].label =
                    format.child_label(&parent_label, class.as_deref(), *index);
            }
        }
    }

    /// Mean top-candidate confidence over every node carrying text.
    pub fn average_text_confidence(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .traverse()
            .into_iter()
            .filter_map(|id| self.nodes[id.0].text_result())
            .filter_map(|t| t.top_score())
            .map(f64::from)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, indent: usize) -> fmt::Result {
        let node = &self.nodes[id.0];
        write!(f, "{:width$}{} {}", "", node.label, node.bbox(), width = indent * 4)?;
        if let Some(text) = node.text() {
            let preview: String = text.chars().take(40).collect();
            write!(f, " \"{preview}\"")?;
        }
        writeln!(f)?;
        for &child in &node.children {
            self.fmt_node(f, child, indent + 1)?;
        }
        Ok(())
    }

    /// Builds a page around an in-memory root for tests that never touch
    /// pixel data.
    #[cfg(test)]
    pub(crate) fn synthetic(label: &str, height: u32, width: u32) -> Self {
        let root = Node {
            height,
            width,
            coord: Point::default(),
            polygon: Bbox::from_size(width, height).polygon(),
            mask: None,
            parent: None,
            children: Vec::new(),
            depth: 0,
            label: label.to_string(),
            data: HashMap::new(),
            image: None,
            kind: NodeKind::Page {
                path: std::path::PathBuf::from(format!("{label}.png")),
                original_size: (height, width),
                ratio: 1.0,
            },
        };
        Self { nodes: vec![root] }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root_id(), 0)
    }
}
