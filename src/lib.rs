//! quire: a document-region tree for handwritten text recognition pipelines.
//!
//! A scanned document is modeled as a hierarchy of geometric regions (page,
//! region, line, word) built incrementally by external analysis steps and
//! exported into standard interchange formats.
//!
//! - [`domain`] holds the geometry primitives and the transfer types
//!   analyzers produce ([`Segment`], [`Prediction`]).
//! - [`tree`] holds the mutable hierarchy: per-page node arenas ([`Page`])
//!   and the ordered [`Collection`] with its active-leaf update protocol and
//!   snapshot persistence.
//! - [`export`] projects pages into ALTO, PAGE XML, plain text and JSON with
//!   structural schema validation.
//!
//! # Example
//!
//! ```no_run
//! use quire::{Collection, Prediction, RecognizedText, Segment, Bbox};
//!
//! # fn main() -> quire::QuireResult<()> {
//! let mut collection = Collection::new(vec!["scans/page1.png", "scans/page2.png"]);
//! collection.set_size(1600, 1600);
//!
//! // One segmentation result per active leaf (here: each page root).
//! collection.update(vec![
//!     Prediction::segmentation(vec![Segment::from_bbox(Bbox::new(10, 10, 800, 400))]),
//!     Prediction::segmentation(vec![Segment::from_bbox(Bbox::new(0, 0, 700, 350))]),
//! ])?;
//!
//! // One recognition result per new leaf.
//! collection.update(vec![
//!     Prediction::recognition(RecognizedText::single("first page text", 0.93)),
//!     Prediction::recognition(RecognizedText::single("second page text", 0.88)),
//! ])?;
//!
//! collection.save("outputs", "alto")?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod export;
pub mod tree;
pub mod utils;

pub use crate::core::config::LabelFormat;
pub use crate::core::errors::{QuireError, QuireResult};
pub use crate::domain::geometry::{Bbox, Mask, Point, Polygon, mask_to_polygon};
pub use crate::domain::prediction::{
    Prediction, Property, RecognizedText, TEXT_RESULT_KEY, TextCandidate,
};
pub use crate::domain::segment::Segment;
pub use crate::export::{
    ExportMetadata, Serializer, get_serializer, save_collection, supported_formats,
};
pub use crate::tree::{Collection, Node, NodeId, NodeKind, Page};
