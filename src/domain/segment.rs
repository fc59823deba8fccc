//! Analyzer output unit: one detected sub-region.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::geometry::{Bbox, Mask, Polygon};

/// One detected region, in the coordinate frame of the image that was
/// analyzed (i.e. local to the node whose image the analyzer saw).
///
/// A segment is immutable once handed to the tree: the consuming node takes
/// ownership and keeps the parts it needs to regenerate its pixel image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Bounding box of the region, mandatory.
    pub bbox: Bbox,
    /// Tighter outline than the bbox, when the analyzer produced one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub polygon: Option<Polygon>,
    /// Binary mask local to `bbox`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mask: Option<Mask>,
    /// Detection confidence.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f32>,
    /// Class assigned by the analyzer, e.g. `"text_region"` or `"text_line"`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub class_label: Option<String>,
    /// Extra named attributes passed through to the consuming node.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl Segment {
    /// Creates a segment from a bounding box alone.
    pub fn from_bbox(bbox: Bbox) -> Self {
        Self {
            bbox,
            polygon: None,
            mask: None,
            score: None,
            class_label: None,
            data: HashMap::new(),
        }
    }

    /// Creates a segment from a polygon; the bbox is the polygon's
    /// axis-aligned hull.
    pub fn from_polygon(polygon: Polygon) -> Self {
        let bbox = polygon.bbox();
        Self {
            polygon: Some(polygon),
            ..Self::from_bbox(bbox)
        }
    }

    /// Attaches a binary mask (local to the segment's bbox).
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Attaches a detection confidence.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Attaches a class label.
    pub fn with_class_label(mut self, class_label: impl Into<String>) -> Self {
        self.class_label = Some(class_label.into());
        self
    }

    /// Adds one extra named attribute.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Point;

    #[test]
    fn from_polygon_derives_the_hull_bbox() {
        let polygon = Polygon::new(vec![
            Point::new(10, 5),
            Point::new(40, 5),
            Point::new(40, 25),
            Point::new(10, 25),
        ]);
        let segment = Segment::from_polygon(polygon);
        assert_eq!(segment.bbox, Bbox::new(10, 5, 40, 25));
        assert!(segment.polygon.is_some());
    }

    #[test]
    fn builders_accumulate() {
        let segment = Segment::from_bbox(Bbox::new(0, 0, 10, 10))
            .with_score(0.91)
            .with_class_label("text_line")
            .with_data("reading_order", serde_json::json!(3));
        assert_eq!(segment.score, Some(0.91));
        assert_eq!(segment.class_label.as_deref(), Some("text_line"));
        assert_eq!(segment.data["reading_order"], serde_json::json!(3));
    }
}
