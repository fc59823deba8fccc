//! The document hierarchy: per-page node arenas and the page collection.

pub mod collection;
pub mod node;
pub mod page;

pub use collection::Collection;
pub use node::{Node, NodeId, NodeKind};
pub use page::Page;
