use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diarization::domain::batch::{batch_count, Batch};
use crate::diarization::domain::speaker_assignment::{
    count_distinct_speakers, offset_label, SpeakerAssignment,
};
use crate::diarization::domain::speaker_classifier::{DiarizationError, SpeakerClassifier};
use crate::shared::constants::DIARIZATION_BATCH_SIZE;
use crate::shared::progress::ProgressEvent;
use crate::transcription::domain::segment::Segment;

/// Status prefix of a batch whose classification failed.
pub const KEPT_ORIGINAL_LABELS: &str = "kept original labels";

/// How far numbered labels of a later batch are shifted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerOffsetMode {
    /// Distinct speakers of the immediately preceding batch only.
    #[default]
    PreviousBatch,
    /// Sum of distinct speakers over every earlier batch.
    Cumulative,
}

/// Assigns speakers to a transcript in bounded batches and keeps numbering
/// continuous across batch boundaries.
///
/// Batches run strictly in order since each offset depends on the previous
/// batch's result. A failing batch keeps its original labels; the rest of
/// the transcript is unaffected.
pub struct DiarizationStitcher {
    classifier: Arc<dyn SpeakerClassifier>,
    batch_size: usize,
    offset_mode: SpeakerOffsetMode,
}

impl DiarizationStitcher {
    pub fn new(classifier: Arc<dyn SpeakerClassifier>) -> Self {
        Self {
            classifier,
            batch_size: DIARIZATION_BATCH_SIZE,
            offset_mode: SpeakerOffsetMode::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_offset_mode(mut self, offset_mode: SpeakerOffsetMode) -> Self {
        self.offset_mode = offset_mode;
        self
    }

    /// Label every segment with a speaker. Never fails: on error the affected
    /// batch keeps the labels it came in with.
    pub fn diarize(
        &self,
        segments: Vec<Segment>,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Vec<Segment> {
        // Too little conversation to tell speakers apart.
        if segments.len() <= 2 {
            return segments;
        }

        let total_batches = batch_count(segments.len(), self.batch_size);
        let mut result = Vec::with_capacity(segments.len());
        let mut previous_distinct = 0;
        let mut cumulative_distinct = 0;

        for (index, chunk) in segments.chunks(self.batch_size).enumerate() {
            let speaker_offset = match (index, self.offset_mode) {
                (0, _) => 0,
                (_, SpeakerOffsetMode::PreviousBatch) => previous_distinct,
                (_, SpeakerOffsetMode::Cumulative) => cumulative_distinct,
            };
            let batch = Batch {
                index,
                start: index * self.batch_size,
                segments: chunk.to_vec(),
                speaker_offset,
            };

            let labelled = self.label_batch(batch, total_batches, progress);
            let distinct = count_distinct_speakers(&labelled);
            previous_distinct = distinct;
            cumulative_distinct += distinct;
            result.extend(labelled);
        }

        let speakers = count_distinct_speakers(&result);
        log::info!("Diarization finished: {speakers} speaker(s) over {total_batches} batch(es)");
        progress(ProgressEvent::DiarizationComplete { speakers });
        result
    }

    fn label_batch(
        &self,
        batch: Batch,
        total_batches: usize,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Vec<Segment> {
        let number = batch.index + 1;
        match self.classify(&batch.segments) {
            Ok(assignments) => {
                let segments = apply_assignments(batch, assignments);
                progress(ProgressEvent::Diarizing {
                    batch: number,
                    total_batches,
                    status: format!(
                        "{} speaker(s) in {} segment(s)",
                        count_distinct_speakers(&segments),
                        segments.len()
                    ),
                });
                segments
            }
            Err(e) => {
                log::warn!(
                    "Speaker batch {number}/{total_batches} (segments {}..{}) kept original labels: {e}",
                    batch.start,
                    batch.start + batch.len()
                );
                progress(ProgressEvent::Diarizing {
                    batch: number,
                    total_batches,
                    status: format!("{KEPT_ORIGINAL_LABELS}: {e}"),
                });
                batch.segments
            }
        }
    }

    fn classify(&self, segments: &[Segment]) -> Result<Vec<SpeakerAssignment>, DiarizationError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.classifier.classify(segments)))
            .unwrap_or_else(|_| Err(DiarizationError::Crashed("classifier panicked".to_string())))
    }
}

fn apply_assignments(batch: Batch, assignments: Vec<SpeakerAssignment>) -> Vec<Segment> {
    let mut labels: Vec<Option<String>> = vec![None; batch.len()];
    for assignment in assignments {
        let label = assignment.speaker.trim();
        if label.is_empty() {
            continue;
        }
        if let Some(slot) = labels.get_mut(assignment.index) {
            *slot = Some(offset_label(label, batch.speaker_offset));
        }
    }

    batch
        .segments
        .into_iter()
        .zip(labels)
        .map(|(segment, label)| match label {
            Some(label) => segment.with_speaker(label),
            None => segment,
        })
        .collect()
}
