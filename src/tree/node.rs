//! The document tree's node type and its concrete variants.
//!
//! Nodes live in a per-page arena ([`crate::tree::Page`]); a [`NodeId`] is an
//! index into that arena. Ownership runs strictly parent to children through
//! the id lists, and the parent back-reference is a plain index, so no cycles
//! can form. A node is either the page root (backed by a source image file)
//! or a segment produced by one round of analysis.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::geometry::{Bbox, Mask, Point, Polygon};
use crate::domain::prediction::{Property, RecognizedText, TEXT_RESULT_KEY};

/// Handle to a node within its owning page.
///
/// Ids are only meaningful for the page that produced them and stay valid
/// for that page's whole lifetime; replacing a node's children detaches the
/// old subtree but never invalidates other ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Arena index of this node.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Variant-specific state; everything geometric is shared on [`Node`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The page root, backed by an image file on disk.
    Page {
        /// Source image path.
        path: PathBuf,
        /// Source dimensions as `(height, width)`, fixed at construction.
        original_size: (u32, u32),
        /// Current width divided by original width; 1.0 at construction.
        ratio: f64,
    },
    /// A region cut out of its parent by one analysis round.
    Segment {
        /// Bounding box in the parent's local frame, kept so the node's
        /// image can always be re-cropped from the parent's. Rescaled
        /// together with the node.
        bbox: Bbox,
        /// Class assigned by the analyzer.
        class_label: Option<String>,
        /// Detection confidence.
        score: Option<f32>,
    },
}

/// One element of the document hierarchy.
///
/// All coordinates (`coord`, `polygon`) are absolute in the root page's
/// frame; the mask is local to the node's own bbox. The pixel image is a
/// lazily-filled cache: cleared when the node gains children, transformed in
/// place when the tree is rescaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub(crate) height: u32,
    pub(crate) width: u32,
    pub(crate) coord: Point,
    pub(crate) polygon: Polygon,
    pub(crate) mask: Option<Mask>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: usize,
    pub(crate) label: String,
    pub(crate) data: HashMap<String, Property>,
    #[serde(with = "image_serde", default)]
    pub(crate) image: Option<RgbImage>,
    pub(crate) kind: NodeKind,
}

impl Node {
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Absolute top-left position in the root page's frame.
    #[inline]
    pub fn coord(&self) -> Point {
        self.coord
    }

    /// Bounding box, derived from `coord` and the node's size.
    pub fn bbox(&self) -> Bbox {
        Bbox::from_size(self.width, self.height).move_by(self.coord)
    }

    /// Region outline, absolute in the root page's frame.
    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    /// Binary mask local to this node's bbox, if the region is not
    /// box-shaped.
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Distance from the page root; the root itself is 0.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The analyzer class label, for segment nodes that carry one.
    pub fn class_label(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Segment { class_label, .. } => class_label.as_deref(),
            NodeKind::Page { .. } => None,
        }
    }

    /// The detection confidence, for segment nodes that carry one.
    pub fn score(&self) -> Option<f32> {
        match &self.kind {
            NodeKind::Segment { score, .. } => *score,
            NodeKind::Page { .. } => None,
        }
    }

    /// The node's open annotation map.
    pub fn data(&self) -> &HashMap<String, Property> {
        &self.data
    }

    /// Looks up one annotation value.
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.data.get(key)
    }

    /// Inserts one annotation value, replacing any previous entry.
    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<Property>) {
        self.data.insert(key.into(), value.into());
    }

    /// The recognized-text entry, if any.
    pub fn text_result(&self) -> Option<&RecognizedText> {
        self.data.get(TEXT_RESULT_KEY)?.as_text()
    }

    /// Top-ranked recognized text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text_result()?.top_text()
    }

    pub fn has_text(&self) -> bool {
        self.text().is_some()
    }

    /// Whether the pixel cache currently holds an image.
    pub fn is_materialized(&self) -> bool {
        self.image.is_some()
    }
}

/// Serde adapter for the pixel cache: an `RgbImage` round-trips as
/// dimensions plus its raw byte buffer.
mod image_serde {
    use image::RgbImage;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct RawImage {
        width: u32,
        height: u32,
        data: Vec<u8>,
    }

    pub fn serialize<S>(image: &Option<RgbImage>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let raw = image.as_ref().map(|img| RawImage {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().clone(),
        });
        raw.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<RgbImage>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawImage>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => RgbImage::from_raw(raw.width, raw.height, raw.data)
                .map(Some)
                .ok_or_else(|| {
                    serde::de::Error::custom("pixel buffer length does not match dimensions")
                }),
        }
    }
}
