use std::time::Duration;

use thiserror::Error;

/// The engine could not be brought up. The worker is torn down; retrying
/// starts a fresh load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("failed to start inference worker: {0}")]
    Spawn(String),
    #[error("speech model did not become ready within {}s", .0.as_secs())]
    LoadTimeout(Duration),
    #[error("speech model failed to load: {0}")]
    Load(String),
    #[error("inference worker crashed: {0}")]
    Fault(String),
    #[error("inference worker exited unexpectedly")]
    Disconnected,
}

/// Inference failed or overran its budget. The worker has already been
/// recycled when this is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptionError {
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(
        "transcription did not finish within {}s. Try splitting the recording",
        .0.as_secs()
    )]
    Timeout(Duration),
    #[error("speech engine failed: {0}")]
    Engine(String),
}
