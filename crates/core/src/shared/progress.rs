use std::fmt;

/// Advisory progress notification emitted by the pipeline stages.
///
/// Progress never drives control flow; callers may drop every event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Decoding,
    Loading {
        phase: String,
        percent: Option<f32>,
    },
    Transcribing {
        message: String,
    },
    Diarizing {
        batch: usize,
        total_batches: usize,
        status: String,
    },
    DiarizationComplete {
        speakers: usize,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Decoding => write!(f, "Decoding audio"),
            ProgressEvent::Loading {
                phase,
                percent: Some(pct),
            } => write!(f, "Loading model: {phase} ({pct:.0}%)"),
            ProgressEvent::Loading {
                phase,
                percent: None,
            } => write!(f, "Loading model: {phase}"),
            ProgressEvent::Transcribing { message } => write!(f, "Transcribing: {message}"),
            ProgressEvent::Diarizing {
                batch,
                total_batches,
                status,
            } => write!(f, "Speakers {batch}/{total_batches}: {status}"),
            ProgressEvent::DiarizationComplete { speakers } => {
                write!(f, "Identified {speakers} speaker(s)")
            }
        }
    }
}
