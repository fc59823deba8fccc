//! Plain-text serializer.

use crate::core::errors::QuireResult;
use crate::export::{ExportMetadata, Serializer};
use crate::tree::page::Page;

/// Emits the text of every line node in depth-first document order, one per
/// line with a trailing newline. Everything else (geometry, confidence,
/// metadata) is discarded.
///
/// A page without text serializes to an empty document; the save path
/// pre-checks [`Page::contains_text`] and fails before getting here.
#[derive(Debug, Clone, Default)]
pub struct PlainText;

impl Serializer for PlainText {
    fn format_name(&self) -> &'static str {
        "txt"
    }

    fn extension(&self) -> &'static str {
        ".txt"
    }

    fn serialize(&self, page: &Page, _metadata: &ExportMetadata) -> QuireResult<String> {
        let mut out = String::new();
        for id in page.lines() {
            if let Some(text) = page.node(id).text() {
                out.push_str(text.trim());
                out.push('\n');
            }
        }
        Ok(out)
    }
}
