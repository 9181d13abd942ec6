pub mod audio;
pub mod config;
pub mod diarization;
pub mod inference;
pub mod pipeline;
pub mod shared;
pub mod transcription;
