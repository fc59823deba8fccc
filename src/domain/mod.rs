//! Domain types: geometry primitives and analyzer transfer types.
//!
//! These are the value types the tree is built from. Geometry carries no
//! tree knowledge; segments and predictions are the immutable payloads that
//! external analyzers hand to [`crate::tree`] for consumption.

pub mod geometry;
pub mod prediction;
pub mod segment;

pub use geometry::{Bbox, Mask, Point, Polygon, mask_to_polygon};
pub use prediction::{
    Prediction, Property, RecognizedText, TEXT_RESULT_KEY, TextCandidate,
};
pub use segment::Segment;
