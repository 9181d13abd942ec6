use std::sync::Arc;

use thiserror::Error;

use super::protocol::{EngineOutput, EngineProgress};
use crate::audio::domain::sample_buffer::SampleBuffer;
use crate::shared::cancellation::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<&str> for EngineError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for EngineError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Progress callback for inference. Owned so native callbacks can keep it.
pub type ProgressSink = Arc<dyn Fn(EngineProgress) + Send + Sync>;

/// Domain interface for the speech-to-text engine hosted by a worker.
///
/// An engine lives on exactly one worker thread and is never shared, so it
/// needs neither `Send` nor `Sync`.
pub trait SpeechEngine {
    /// Load weights and prepare for inference. Slow; may download.
    fn load(&mut self, progress: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError>;

    /// Run inference. Engines should poll `cancel` and return early once it
    /// is set; the worker has been abandoned by then.
    fn transcribe(
        &mut self,
        audio: SampleBuffer,
        cancel: &CancellationToken,
        progress: ProgressSink,
    ) -> Result<EngineOutput, EngineError>;
}

/// Builds a fresh engine inside each new worker context.
pub trait SpeechEngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SpeechEngine>, EngineError>;
}
