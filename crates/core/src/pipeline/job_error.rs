use thiserror::Error;

use crate::audio::domain::preprocess_error::PreprocessError;
use crate::inference::domain::worker_error::TranscriptionError;

/// Why a single transcription job failed.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Whether running the same file again may succeed.
    ///
    /// Worker and engine failures leave a recycled worker behind, so a retry
    /// starts clean. Media problems and overruns fail again on the same input.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Preprocess(PreprocessError::Io(_)) => true,
            JobError::Preprocess(_) => false,
            JobError::Transcription(TranscriptionError::Timeout(_)) => false,
            JobError::Transcription(_) => true,
            JobError::Io(_) => true,
        }
    }

    /// Message suitable for showing next to the failed file.
    pub fn user_message(&self) -> String {
        let message = capitalize(&self.to_string());
        if self.is_retryable() {
            format!("{message}. Please try again.")
        } else {
            message
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::domain::worker_error::WorkerError;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case::undecodable(PreprocessError::Decode("bad header".into()).into(), false)]
    #[case::decode_timeout(PreprocessError::DecodeTimeout(Duration::from_secs(300)).into(), false)]
    #[case::low_rate(PreprocessError::UnsupportedSampleRate { input: 8000, target: 16000 }.into(), false)]
    #[case::no_audio(PreprocessError::NoAudioTrack.into(), false)]
    #[case::load_timeout(TranscriptionError::from(WorkerError::LoadTimeout(Duration::from_secs(300))).into(), true)]
    #[case::fault(TranscriptionError::from(WorkerError::Fault("boom".into())).into(), true)]
    #[case::engine(TranscriptionError::Engine("oom".into()).into(), true)]
    #[case::overrun(TranscriptionError::Timeout(Duration::from_secs(1800)).into(), false)]
    fn test_retryability(#[case] error: JobError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn test_media_message_is_actionable() {
        let error: JobError = PreprocessError::Decode("unknown codec".into()).into();
        let message = error.user_message();
        assert!(message.starts_with("Could not decode media"));
        assert!(message.contains("WAV or MP3"));
        assert!(!message.contains("try again"));
    }

    #[test]
    fn test_retryable_message_invites_retry() {
        let error: JobError = TranscriptionError::from(WorkerError::Disconnected).into();
        assert_eq!(
            error.user_message(),
            "Inference worker exited unexpectedly. Please try again."
        );
    }
}
