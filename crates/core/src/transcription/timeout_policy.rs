use std::time::Duration;

use crate::shared::constants::{
    TRANSCRIBE_TIMEOUT_FACTOR, TRANSCRIBE_TIMEOUT_MAX, TRANSCRIBE_TIMEOUT_MIN,
};

/// Transcription deadline as a function of audio length.
///
/// `clamp(duration * factor, min, max)`: the floor covers fixed model
/// overhead on short clips, the ceiling bounds a hung engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeoutPolicy {
    /// Seconds of budget per second of audio.
    pub factor: f64,
    pub min: Duration,
    pub max: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            factor: TRANSCRIBE_TIMEOUT_FACTOR,
            min: TRANSCRIBE_TIMEOUT_MIN,
            max: TRANSCRIBE_TIMEOUT_MAX,
        }
    }
}

impl TimeoutPolicy {
    pub fn timeout_for(&self, duration_secs: f64) -> Duration {
        let secs = duration_secs * self.factor;
        if secs.is_nan() || secs <= 0.0 {
            return self.min;
        }
        let max = self.max.max(self.min);
        Duration::from_secs_f64(secs.min(max.as_secs_f64())).clamp(self.min, max)
    }
}
