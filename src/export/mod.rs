//! Serialization engine: projecting page trees into interchange formats.
//!
//! Each output format implements [`Serializer`]; instances come from the
//! static registry via [`get_serializer`] or are built directly. All formats
//! share the [`ExportMetadata`] block and the labels produced by the
//! relabeling pass.

pub mod alto;
pub mod json;
pub mod page_xml;
pub mod text;
pub mod xml;

pub use alto::Alto;
pub use json::Json;
pub use page_xml::PageXml;
pub use text::PlainText;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::errors::{QuireError, QuireResult};
use crate::tree::collection::Collection;
use crate::tree::page::Page;

/// Names accepted by [`get_serializer`], sorted.
pub const SUPPORTED_FORMATS: [&str; 4] = ["alto", "json", "page", "txt"];

/// The supported format names.
pub fn supported_formats() -> &'static [&'static str] {
    &SUPPORTED_FORMATS
}

/// One output format.
///
/// `serialize` renders a single page into a document string; `validate`
/// checks a document against the format's structural schema rules and is a
/// no-op for formats without a schema. Validation never repairs output.
pub trait Serializer {
    /// Registry name, e.g. `"alto"`.
    fn format_name(&self) -> &'static str;

    /// File extension including the dot, e.g. `".xml"`.
    fn extension(&self) -> &'static str;

    /// Renders one page into a document string.
    fn serialize(&self, page: &Page, metadata: &ExportMetadata) -> QuireResult<String>;

    /// Checks `document` against the format's schema rules.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The document conforms.
    /// * `Err(QuireError::SchemaViolation)` - On mismatch, with element
    ///   context where available.
    fn validate(&self, _document: &str) -> QuireResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("format", &self.format_name())
            .finish()
    }
}

/// Looks up a serializer by format name (case-insensitive).
///
/// # Returns
///
/// * `Ok(Box<dyn Serializer>)` - A serializer with default settings.
/// * `Err(QuireError::UnsupportedFormat)` - Unknown name; the error lists
///   the supported set.
pub fn get_serializer(name: &str) -> QuireResult<Box<dyn Serializer>> {
    match name.to_ascii_lowercase().as_str() {
        "alto" => Ok(Box::new(Alto::new())),
        "json" => Ok(Box::new(Json::default())),
        "page" => Ok(Box::new(PageXml::new())),
        "txt" => Ok(Box::new(PlainText)),
        _ => Err(QuireError::UnsupportedFormat {
            name: name.to_string(),
            supported: SUPPORTED_FORMATS.join(", "),
        }),
    }
}

/// Metadata embedded into every exported document.
///
/// Defaults are drawn from the crate's own package metadata; timestamps are
/// taken when the value is constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub creator: String,
    pub software_name: String,
    pub software_version: String,
    pub application_description: String,
    pub created: DateTime<Utc>,
    pub last_change: DateTime<Utc>,
    /// Free-form descriptions of the analysis steps that produced the tree,
    /// rendered as processing steps where the format supports them.
    pub processing_steps: Vec<String>,
}

impl Default for ExportMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            creator: env!("CARGO_PKG_AUTHORS").to_string(),
            software_name: env!("CARGO_PKG_NAME").to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            application_description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            created: now,
            last_change: now,
            processing_steps: Vec::new(),
        }
    }
}

impl ExportMetadata {
    /// Appends one processing-step description.
    pub fn with_processing_step(mut self, description: impl Into<String>) -> Self {
        self.processing_steps.push(description.into());
        self
    }

    /// Creation timestamp as RFC 3339.
    pub fn created_rfc3339(&self) -> String {
        self.created.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Last-change timestamp as RFC 3339.
    pub fn last_change_rfc3339(&self) -> String {
        self.last_change.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Serializes and writes one file per page under
/// `{directory}/{collection label}/{page label}{extension}`.
///
/// The collection is relabeled and every page restored to its source
/// dimensions first, so output geometry is in the source image's frame.
/// Directories are created as needed and existing files are overwritten
/// silently.
///
/// # Returns
///
/// * `Ok(Vec<PathBuf>)` - The written file paths, in page order.
/// * `Err(QuireError::EmptyPage)` - As soon as a page with no text anywhere
///   in its subtree is reached; earlier pages stay written.
/// * `Err(QuireError::Io)` - On write failure.
pub fn save_collection(
    collection: &mut Collection,
    serializer: &dyn Serializer,
    directory: &Path,
    metadata: &ExportMetadata,
) -> QuireResult<Vec<PathBuf>> {
    collection.relabel();
    collection.to_original_size();
    let target = directory.join(collection.label());

    let mut written = Vec::with_capacity(collection.len());
    for page in collection.pages() {
        if !page.contains_text() {
            return Err(QuireError::EmptyPage {
                label: page.label().to_string(),
            });
        }
        let document = serializer.serialize(page, metadata)?;
        std::fs::create_dir_all(&target)?;
        let path = target.join(format!("{}{}", page.label(), serializer.extension()));
        std::fs::write(&path, document)?;
        info!(
            format = serializer.format_name(),
            path = %path.display(),
            "wrote document"
        );
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_supported_name() {
        for name in supported_formats() {
            let serializer = get_serializer(name).unwrap();
            assert_eq!(serializer.format_name(), *name);
        }
        // Case-insensitive lookup.
        assert_eq!(get_serializer("ALTO").unwrap().format_name(), "alto");
    }

    #[test]
    fn unknown_format_error_enumerates_the_registry() {
        let err = get_serializer("pdf").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pdf"));
        for name in supported_formats() {
            assert!(msg.contains(name), "missing {name} in: {msg}");
        }
    }

    #[test]
    fn default_metadata_reads_package_fields() {
        let metadata = ExportMetadata::default();
        assert_eq!(metadata.software_name, "quire");
        assert!(!metadata.software_version.is_empty());
        // RFC 3339 with a Z suffix.
        assert!(metadata.created_rfc3339().ends_with('Z'));
    }

    #[test]
    fn processing_steps_accumulate_in_order() {
        let metadata = ExportMetadata::default()
            .with_processing_step("region segmentation")
            .with_processing_step("line segmentation")
            .with_processing_step("text recognition");
        assert_eq!(metadata.processing_steps.len(), 3);
        assert_eq!(metadata.processing_steps[0], "region segmentation");
    }
}
