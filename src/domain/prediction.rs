//! Analyzer output envelope and node annotation values.
//!
//! A [`Prediction`] is what an external analyzer hands back for one node:
//! segments to subdivide it with, annotation data to merge into it, or both.
//! Recognized text travels inside the annotation map under
//! [`TEXT_RESULT_KEY`], so a single update operation covers segmentation and
//! recognition alike.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::segment::Segment;

/// Annotation key under which recognized text is stored.
pub const TEXT_RESULT_KEY: &str = "text_result";

/// One recognition hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    pub text: String,
    pub score: f32,
}

impl TextCandidate {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// A ranked list of recognition hypotheses for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    candidates: Vec<TextCandidate>,
}

impl RecognizedText {
    pub fn new(candidates: Vec<TextCandidate>) -> Self {
        Self { candidates }
    }

    /// Builds the candidate list from `(text, score)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, f32)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(text, score)| TextCandidate { text, score })
                .collect(),
        )
    }

    /// Convenience constructor for a single hypothesis.
    pub fn single(text: impl Into<String>, score: f32) -> Self {
        Self::new(vec![TextCandidate::new(text, score)])
    }

    pub fn candidates(&self) -> &[TextCandidate] {
        &self.candidates
    }

    /// The highest-scoring candidate, if any.
    pub fn top_candidate(&self) -> Option<&TextCandidate> {
        self.candidates
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn top_text(&self) -> Option<&str> {
        self.top_candidate().map(|c| c.text.as_str())
    }

    pub fn top_score(&self) -> Option<f32> {
        self.top_candidate().map(|c| c.score)
    }
}

/// One typed annotation value in a node's open annotation map.
///
/// Internally tagged so snapshots round-trip without guessing between
/// numbers and arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Property {
    Text(RecognizedText),
    Str(String),
    Number(f64),
    Bool(bool),
    Json(serde_json::Value),
}

impl Property {
    /// The recognized-text payload, if this is a text property.
    pub fn as_text(&self) -> Option<&RecognizedText> {
        match self {
            Property::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Property::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<RecognizedText> for Property {
    fn from(text: RecognizedText) -> Self {
        Property::Text(text)
    }
}

impl From<&str> for Property {
    fn from(s: &str) -> Self {
        Property::Str(s.to_string())
    }
}

impl From<String> for Property {
    fn from(s: String) -> Self {
        Property::Str(s)
    }
}

impl From<f64> for Property {
    fn from(n: f64) -> Self {
        Property::Number(n)
    }
}

impl From<bool> for Property {
    fn from(b: bool) -> Self {
        Property::Bool(b)
    }
}

impl From<serde_json::Value> for Property {
    fn from(value: serde_json::Value) -> Self {
        Property::Json(value)
    }
}

/// Everything an analyzer reports for one node.
///
/// An empty segment list means "do not subdivide"; the annotation map is
/// merged into the node either way, so one prediction can subdivide a node
/// and attach metadata to it at the same time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub segments: Vec<Segment>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub data: HashMap<String, Property>,
}

impl Prediction {
    /// A prediction with no effect.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A segmentation outcome: subdivide the node with these segments.
    pub fn segmentation(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            data: HashMap::new(),
        }
    }

    /// A recognition outcome: attach text candidates to the node.
    pub fn recognition(text: RecognizedText) -> Self {
        let mut data = HashMap::new();
        data.insert(TEXT_RESULT_KEY.to_string(), Property::Text(text));
        Self {
            segments: Vec::new(),
            data,
        }
    }

    /// Adds one annotation entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Property>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
