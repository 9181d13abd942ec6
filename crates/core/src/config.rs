use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diarization::stitcher::SpeakerOffsetMode;
use crate::shared::constants::{
    DECODE_TIMEOUT, DIARIZATION_BATCH_SIZE, DIARIZATION_REQUEST_TIMEOUT, TARGET_SAMPLE_RATE,
    TRANSCRIBE_TIMEOUT_FACTOR, TRANSCRIBE_TIMEOUT_MAX, TRANSCRIBE_TIMEOUT_MIN,
    TRANSCRIPTION_LANGUAGE, WHISPER_MODEL_NAME, WHISPER_MODEL_URL, WORKER_LOAD_TIMEOUT,
};
use crate::transcription::timeout_policy::TimeoutPolicy;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// User-tunable pipeline settings, persisted as JSON.
///
/// Every field has a default so partial files stay valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub language: String,
    pub model_name: String,
    pub model_url: String,
    /// Local model file; skips the download cache when set.
    pub model_path: Option<PathBuf>,
    pub target_sample_rate: u32,
    pub decode_timeout_secs: u64,
    pub load_timeout_secs: u64,
    /// Seconds of transcription budget per second of audio.
    pub timeout_factor: f64,
    pub timeout_min_secs: u64,
    pub timeout_max_secs: u64,
    /// Speaker classification endpoint. Diarization is skipped when unset.
    pub diarization_url: Option<String>,
    pub diarization_batch_size: usize,
    pub diarization_timeout_secs: u64,
    pub speaker_offset_mode: SpeakerOffsetMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: TRANSCRIPTION_LANGUAGE.to_string(),
            model_name: WHISPER_MODEL_NAME.to_string(),
            model_url: WHISPER_MODEL_URL.to_string(),
            model_path: None,
            target_sample_rate: TARGET_SAMPLE_RATE,
            decode_timeout_secs: DECODE_TIMEOUT.as_secs(),
            load_timeout_secs: WORKER_LOAD_TIMEOUT.as_secs(),
            timeout_factor: TRANSCRIBE_TIMEOUT_FACTOR,
            timeout_min_secs: TRANSCRIBE_TIMEOUT_MIN.as_secs(),
            timeout_max_secs: TRANSCRIBE_TIMEOUT_MAX.as_secs(),
            diarization_url: None,
            diarization_batch_size: DIARIZATION_BATCH_SIZE,
            diarization_timeout_secs: DIARIZATION_REQUEST_TIMEOUT.as_secs(),
            speaker_offset_mode: SpeakerOffsetMode::default(),
        }
    }
}

impl Settings {
    /// `<config dir>/voxscribe/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("voxscribe").join("settings.json"))
    }

    /// Load from `path`. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from [`Settings::default_path`], falling back to defaults when the
    /// platform has no config directory.
    pub fn load_default() -> Result<Self, SettingsError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source: std::io::Error| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.into()))?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn diarization_timeout(&self) -> Duration {
        Duration::from_secs(self.diarization_timeout_secs)
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            factor: self.timeout_factor,
            min: Duration::from_secs(self.timeout_min_secs),
            max: Duration::from_secs(self.timeout_max_secs.max(self.timeout_min_secs)),
        }
    }
}
