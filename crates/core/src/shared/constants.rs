use std::time::Duration;

/// Sample rate the speech engine expects.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Upper bound for decoding a single uploaded file.
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Upper bound for the engine to report `Ready` after a `Load` request.
pub const WORKER_LOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long a new worker waits for a cancelled one to release its engine.
pub const WORKER_EXIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Transcription budget per second of audio.
pub const TRANSCRIBE_TIMEOUT_FACTOR: f64 = 20.0;
pub const TRANSCRIBE_TIMEOUT_MIN: Duration = Duration::from_secs(30 * 60);
pub const TRANSCRIBE_TIMEOUT_MAX: Duration = Duration::from_secs(6 * 60 * 60);

/// Maximum segments sent to the speaker classifier in one request.
pub const DIARIZATION_BATCH_SIZE: usize = 100;
pub const DIARIZATION_REQUEST_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Label given to every segment before diarization.
pub const DEFAULT_SPEAKER: &str = "Speaker 1";
pub const SPEAKER_LABEL_PREFIX: &str = "Speaker ";

/// Text of the single segment emitted when the engine recognized nothing.
pub const NO_SPEECH_PLACEHOLDER: &str = "[No speech detected]";

pub const TRANSCRIPTION_LANGUAGE: &str = "en";

pub const WHISPER_MODEL_NAME: &str = "ggml-base.bin";
pub const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin";
