use std::time::Duration;

use thiserror::Error;

/// Input media problems. None of these are retried automatically; the
/// messages tell the user what to do with the file.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("could not decode media: {0}. Try converting the file to WAV or MP3")]
    Decode(String),
    #[error(
        "decoding did not finish within {}s. Try splitting the file into shorter parts",
        .0.as_secs()
    )]
    DecodeTimeout(Duration),
    #[error(
        "sample rate {input} Hz is below the required {target} Hz; upsampling is not supported"
    )]
    UnsupportedSampleRate { input: u32, target: u32 },
    #[error("the file contains no audio track")]
    NoAudioTrack,
    #[error("failed to stage media for decoding: {0}")]
    Io(#[from] std::io::Error),
}
