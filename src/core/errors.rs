//! Error types shared across the document tree and export engine.
//!
//! The crate funnels every failure through [`QuireError`] so callers deal with
//! a single error surface. Variants are grouped by origin: image I/O, tree
//! update protocol violations, export preconditions and schema checks, and
//! snapshot persistence.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type QuireResult<T> = std::result::Result<T, QuireError>;

/// Errors produced by collection building, tree mutation, persistence and
/// export.
#[derive(Debug, Error)]
pub enum QuireError {
    /// An image file could not be opened or decoded.
    #[error("image load failed for '{path}': {source}")]
    ImageLoad {
        /// Path of the offending file.
        path: String,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// A caller handed in data that violates a documented precondition.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// The number of analyzer results does not match the number of active
    /// leaves the collection expected them for.
    #[error("size of input ({results}) does not match the size of the tree ({leaves})")]
    CountMismatch {
        /// How many results the caller supplied.
        results: usize,
        /// How many active leaves the collection currently has.
        leaves: usize,
    },

    /// A page was about to be exported even though no node in its subtree
    /// carries text.
    #[error("page '{label}' contains no text and cannot be exported")]
    EmptyPage {
        /// Label of the page that failed the precondition.
        label: String,
    },

    /// An output format name that is not in the registry was requested.
    #[error("unsupported format '{name}': expected one of {supported}")]
    UnsupportedFormat {
        /// The requested name.
        name: String,
        /// Comma-separated list of registered format names.
        supported: String,
    },

    /// A serialized document failed the structural checks of its format.
    #[error("schema violation in {format} document: {message}")]
    SchemaViolation {
        /// Format whose rules were violated.
        format: String,
        /// What was wrong, with element context where available.
        message: String,
    },

    /// A persisted snapshot could not be restored into a collection.
    #[error("snapshot at '{path}' does not contain a collection: {source}")]
    Snapshot {
        /// Path of the snapshot file.
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization failure.
    #[error("json")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl QuireError {
    /// Creates an [`QuireError::ImageLoad`] with path context.
    pub fn image_load(path: impl AsRef<std::path::Path>, source: image::ImageError) -> Self {
        Self::ImageLoad {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Creates an [`QuireError::InvalidInput`] from any displayable message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a [`QuireError::SchemaViolation`] for the given format.
    pub fn schema_violation(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Creates a [`QuireError::Snapshot`] with path context.
    pub fn snapshot(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        Self::Snapshot {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
