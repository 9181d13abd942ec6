use thiserror::Error;

use super::speaker_assignment::SpeakerAssignment;
use crate::transcription::domain::segment::Segment;

/// A failed classification call. Always recovered per batch by the stitcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiarizationError {
    #[error("speaker service unreachable: {0}")]
    Transport(String),
    #[error("speaker service returned HTTP {0}")]
    Status(u16),
    #[error("speaker service reported: {0}")]
    Service(String),
    #[error("malformed speaker service response: {0}")]
    Decode(String),
    #[error("speaker classifier crashed: {0}")]
    Crashed(String),
}

/// Domain interface for the external speaker-classification service.
pub trait SpeakerClassifier: Send + Sync {
    /// Label the segments of one batch. Indices in the result are positions
    /// within `batch`; indices left out keep their current label.
    fn classify(&self, batch: &[Segment]) -> Result<Vec<SpeakerAssignment>, DiarizationError>;
}
