//! Configuration types consumed by the core.
//!
//! The only tunable the tree itself understands is the label format used by
//! the relabeling pass. Page size limits and serializer choices are plain
//! arguments on the operations that use them.

use serde::{Deserialize, Serialize};

/// Controls how the relabeling pass builds node labels.
///
/// A node's label is its parent's label plus a positional suffix, so every
/// label encodes the path from the page root. The format only affects how
/// the suffix is spelled; sibling suffixes are distinct under every
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFormat {
    /// Separator between a parent label and a child suffix.
    pub separator: String,
    /// Use the segment's class label (when present) as the suffix stem
    /// instead of the generic stem, numbering each class independently.
    pub use_class_labels: bool,
    /// Zero-pad sibling indices to this width. `0` disables padding.
    pub index_width: usize,
}

impl Default for LabelFormat {
    fn default() -> Self {
        Self {
            separator: "_".into(),
            use_class_labels: true,
            index_width: 0,
        }
    }
}

impl LabelFormat {
    /// Suffix stem used when a node has no class label (or class labels are
    /// disabled).
    pub const FALLBACK_STEM: &'static str = "node";

    /// Sets the separator between parent label and suffix.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Enables or disables class-label suffix stems.
    pub fn with_class_labels(mut self, use_class_labels: bool) -> Self {
        self.use_class_labels = use_class_labels;
        self
    }

    /// Sets the zero-padding width for sibling indices.
    pub fn with_index_width(mut self, index_width: usize) -> Self {
        self.index_width = index_width;
        self
    }

    /// Builds one child label from the parent label, an optional class label
    /// and the 1-based index of the child within its suffix group.
    pub fn child_label(&self, parent: &str, class_label: Option<&str>, index: usize) -> String {
        let stem = match class_label {
            Some(class) if self.use_class_labels => class,
            _ => Self::FALLBACK_STEM,
        };
        format!(
            "{parent}{sep}{stem}{index:0>width$}",
            sep = self.separator,
            index = index,
            width = self.index_width
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_appends_class_and_index() {
        let format = LabelFormat::default();
        assert_eq!(
            format.child_label("page1", Some("text_region"), 2),
            "page1_text_region2"
        );
    }

    #[test]
    fn fallback_stem_is_used_without_class_label() {
        let format = LabelFormat::default();
        assert_eq!(format.child_label("page1", None, 1), "page1_node1");
    }

    #[test]
    fn class_labels_can_be_disabled() {
        let format = LabelFormat::default().with_class_labels(false);
        assert_eq!(format.child_label("p", Some("line"), 3), "p_node3");
    }

    #[test]
    fn index_width_pads_with_zeros() {
        let format = LabelFormat::default().with_index_width(4);
        assert_eq!(
            format.child_label("p", Some("region"), 7),
            "p_region0007"
        );
    }

    #[test]
    fn separator_is_configurable() {
        let format = LabelFormat::default().with_separator("-");
        assert_eq!(format.child_label("p", None, 1), "p-node1");
    }
}
