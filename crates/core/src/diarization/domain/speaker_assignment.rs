use std::collections::HashSet;

use crate::shared::constants::SPEAKER_LABEL_PREFIX;
use crate::transcription::domain::segment::Segment;

/// Label returned by the classifier for the segment at `index` within a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeakerAssignment {
    pub index: usize,
    pub speaker: String,
}

impl SpeakerAssignment {
    pub fn new(index: usize, speaker: impl Into<String>) -> Self {
        Self {
            index,
            speaker: speaker.into(),
        }
    }
}

/// `n` for labels of the form `"Speaker <n>"`.
pub fn speaker_number(label: &str) -> Option<usize> {
    label
        .strip_prefix(SPEAKER_LABEL_PREFIX)?
        .trim()
        .parse()
        .ok()
}

/// Shift a numbered label by `offset`. Other labels, and numbers too large
/// to shift, pass through.
pub fn offset_label(label: &str, offset: usize) -> String {
    match speaker_number(label).and_then(|n| n.checked_add(offset)) {
        Some(shifted) if offset > 0 => format!("{SPEAKER_LABEL_PREFIX}{shifted}"),
        _ => label.to_string(),
    }
}

pub fn count_distinct_speakers(segments: &[Segment]) -> usize {
    segments
        .iter()
        .map(|s| s.speaker.as_str())
        .collect::<HashSet<_>>()
        .len()
}
