use serde::{Deserialize, Serialize};

use crate::shared::constants::DEFAULT_SPEAKER;

/// A timestamped span of recognized speech and who said it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds from the beginning of the recording.
    pub timestamp: f64,
    pub text: String,
    pub speaker: String,
}

impl Segment {
    pub fn new(timestamp: f64, text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
            speaker: speaker.into(),
        }
    }

    /// Segment carrying the pre-diarization placeholder speaker.
    pub fn unattributed(timestamp: f64, text: impl Into<String>) -> Self {
        Self::new(timestamp, text, DEFAULT_SPEAKER)
    }

    pub fn with_speaker(self, speaker: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            ..self
        }
    }
}
