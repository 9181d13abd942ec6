use std::collections::HashMap;
use std::time::Instant;

use crate::shared::progress::ProgressEvent;

/// Cross-cutting logger for job orchestration events.
///
/// Decouples the use case from specific output mechanisms (stderr, channel to
/// a UI, log crate) so each caller can observe a job without changing the
/// orchestration code.
pub trait PipelineLogger: Send {
    /// Report a stage's progress notification.
    fn progress(&mut self, event: &ProgressEvent);

    /// Record how long a named stage took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. segment count, audio seconds).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-job summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _event: &ProgressEvent) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger backed by the `log` facade that keeps per-stage timings and
/// metrics for a summary at the end of the job.
///
/// Repeated `Loading` events with a percentage are throttled to every
/// `throttle_percent` points so a model download does not flood the log.
pub struct LogPipelineLogger {
    throttle_percent: f32,
    last_loading_percent: Option<f32>,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    events: usize,
    messages: Vec<String>,
}

impl LogPipelineLogger {
    pub fn new(throttle_percent: f32) -> Self {
        Self {
            throttle_percent: throttle_percent.max(0.0),
            last_loading_percent: None,
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            events: 0,
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = Vec::new();

        lines.push(format!(
            "Job summary ({} progress events, {:.1}s total):",
            self.events,
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let total_ms: f64 = self.timings[stage].iter().sum();
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!("  {stage:12}: {total_ms:8.0}ms  ({pct:4.1}%)"));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let last = values.last().copied().unwrap_or_default();
            lines.push(format!("  {name}: {last:.1}"));
        }

        if let (Some(audio), Some(transcribe)) = (
            self.metrics.get("audio_seconds").and_then(|v| v.last()),
            self.timings.get("transcribe"),
        ) {
            let transcribe_secs: f64 = transcribe.iter().sum::<f64>() / 1000.0;
            if transcribe_secs > 0.0 {
                lines.push(format!("  Real-time factor: {:.2}x", audio / transcribe_secs));
            }
        }

        Some(lines.join("\n"))
    }

    /// Returns the timing data for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    /// Returns the metric data for a given name.
    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    fn should_log_loading(&mut self, percent: Option<f32>) -> bool {
        let Some(pct) = percent else {
            self.last_loading_percent = None;
            return true;
        };
        let due = match self.last_loading_percent {
            None => true,
            Some(last) => pct >= 100.0 || pct - last >= self.throttle_percent || pct < last,
        };
        if due {
            self.last_loading_percent = Some(pct);
        }
        due
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, event: &ProgressEvent) {
        self.events += 1;
        match event {
            ProgressEvent::Loading { percent, .. } => {
                if self.should_log_loading(*percent) {
                    log::info!("{event}");
                }
            }
            _ => log::info!("{event}"),
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
