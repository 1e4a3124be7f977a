//! Spoken output produced by a dialog session.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One piece of a spoken prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Text to be synthesized
    Text(String),
    /// Pre-recorded audio
    Audio {
        /// Location of the audio resource
        src: String,
    },
}

/// A unit of output delivered by the session.
///
/// Immutable once delivered; the harness hands it over to the driver as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Utterance {
    /// Prompt content in document order
    pub segments: Vec<Segment>,
}

impl Utterance {
    /// Create an utterance from segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Create an utterance consisting of a single text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Segment::Text(text.into())])
    }

    /// Create an utterance consisting of a single audio segment.
    pub fn audio(src: impl Into<String>) -> Self {
        Self::new(vec![Segment::Audio { src: src.into() }])
    }

    /// An utterance with no content.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Spoken text: all text segments concatenated in order.
    pub fn text_content(&self) -> String {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Text(text) => Some(text.as_str()),
                Segment::Audio { .. } => None,
            })
            .collect()
    }

    /// Sources of all audio segments.
    pub fn audio_sources(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Audio { src } => Some(src.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// True when there is neither audio nor non-whitespace text.
    pub fn is_blank(&self) -> bool {
        self.segments.iter().all(|segment| match segment {
            Segment::Text(text) => text.trim().is_empty(),
            Segment::Audio { .. } => false,
        })
    }
}

impl std::fmt::Display for Utterance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::Audio { src } => write!(f, "<audio src=\"{src}\"/>")?,
            }
        }
        Ok(())
    }
}
