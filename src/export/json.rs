//! JSON serializer.
//!
//! Dumps the page subtree and the export metadata as one JSON document per
//! page. Unlike the XML formats, this keeps properties they cannot express,
//! such as per-region confidence scores and the open annotation maps.

use serde_json::json;

use crate::core::errors::QuireResult;
use crate::export::{ExportMetadata, Serializer};
use crate::tree::page::Page;

/// The JSON serializer. Pixel caches are dropped from the output.
#[derive(Debug, Clone)]
pub struct Json {
    /// Pretty-print with indentation; compact single-line output otherwise.
    pub pretty: bool,
}

impl Default for Json {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Json {
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Serializer for Json {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        ".json"
    }

    fn serialize(&self, page: &Page, metadata: &ExportMetadata) -> QuireResult<String> {
        let mut page = page.clone();
        page.clear_images();
        let document = json!({
            "metadata": metadata,
            "page": page,
        });
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(rendered)
    }
}
