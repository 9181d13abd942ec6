use std::sync::Arc;

use crate::audio::domain::sample_buffer::SampleBuffer;
use crate::inference::domain::protocol::EngineOutput;
use crate::inference::domain::worker_error::TranscriptionError;
use crate::inference::supervisor::InferenceWorkerSupervisor;
use crate::shared::constants::NO_SPEECH_PLACEHOLDER;
use crate::shared::progress::ProgressEvent;
use crate::transcription::domain::segment::Segment;
use crate::transcription::timeout_policy::TimeoutPolicy;

/// Sends one decoded buffer through the supervised worker and turns the
/// engine's reply into segments.
///
/// Every failure path resets the supervisor before the error is returned, so
/// a retry never inherits a half-dead worker.
pub struct TranscriptionDispatcher {
    supervisor: Arc<InferenceWorkerSupervisor>,
    policy: TimeoutPolicy,
}

impl TranscriptionDispatcher {
    pub fn new(supervisor: Arc<InferenceWorkerSupervisor>) -> Self {
        Self {
            supervisor,
            policy: TimeoutPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn supervisor(&self) -> &InferenceWorkerSupervisor {
        &self.supervisor
    }

    pub fn transcribe(
        &self,
        audio: SampleBuffer,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<Vec<Segment>, TranscriptionError> {
        if let Err(e) = self.supervisor.ensure_ready(progress) {
            self.supervisor.reset();
            return Err(e.into());
        }

        let duration = audio.duration_secs();
        let timeout = self.policy.timeout_for(duration);
        log::info!(
            "Transcribing {duration:.1}s of audio (timeout {:.0}s)",
            timeout.as_secs_f64()
        );

        match self.supervisor.transcribe(audio, timeout, progress) {
            Ok(output) => {
                let segments = normalize_output(output);
                log::info!("Transcription produced {} segment(s)", segments.len());
                Ok(segments)
            }
            Err(e) => {
                self.supervisor.reset();
                Err(e)
            }
        }
    }
}

/// Convert an engine reply of any shape into at least one segment.
///
/// Chunks with blank text are skipped; a chunk without a usable start time
/// inherits the previous one. With no usable chunks, the whole-text output
/// (or a placeholder) becomes a single segment at 0s.
pub fn normalize_output(output: EngineOutput) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_timestamp = 0.0;

    for chunk in output.chunks.unwrap_or_default() {
        let text = match chunk.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => continue,
        };
        let timestamp = chunk
            .timestamp
            .and_then(|t| t.start())
            .filter(|t| t.is_finite())
            .map(|t| t.max(0.0))
            .unwrap_or(last_timestamp);
        last_timestamp = timestamp;
        segments.push(Segment::unattributed(timestamp, text));
    }

    if segments.is_empty() {
        let text = output
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NO_SPEECH_PLACEHOLDER);
        segments.push(Segment::unattributed(0.0, text));
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::domain::protocol::EngineProgress;
    use crate::inference::domain::speech_engine::{
        EngineError, ProgressSink, SpeechEngine, SpeechEngineFactory,
    };
    use crate::inference::domain::worker_error::WorkerError;
    use crate::inference::domain::worker_state::WorkerState;
    use crate::inference::infrastructure::thread_worker_context::ThreadWorkerFactory;
    use crate::shared::cancellation::CancellationToken;
    use crate::shared::constants::DEFAULT_SPEAKER;
    use rstest::rstest;
    use std::time::Duration;

    // ─── Stubs ───

    #[derive(Clone)]
    struct FixedEngine {
        load: Result<(), String>,
        reply: Result<EngineOutput, String>,
    }

    impl SpeechEngine for FixedEngine {
        fn load(&mut self, _: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError> {
            self.load.clone().map_err(EngineError)
        }

        fn transcribe(
            &mut self,
            _: SampleBuffer,
            _: &CancellationToken,
            progress: ProgressSink,
        ) -> Result<EngineOutput, EngineError> {
            progress(EngineProgress::phase("decoding"));
            self.reply.clone().map_err(EngineError)
        }
    }

    impl SpeechEngineFactory for FixedEngine {
        fn create(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
            Ok(Box::new(self.clone()))
        }
    }

    fn dispatcher(engine: FixedEngine) -> TranscriptionDispatcher {
        let supervisor = InferenceWorkerSupervisor::new(Box::new(ThreadWorkerFactory::new(
            Arc::new(engine),
        )))
        .with_load_timeout(Duration::from_secs(5));
        TranscriptionDispatcher::new(Arc::new(supervisor))
    }

    fn replying(json: &str) -> FixedEngine {
        FixedEngine {
            load: Ok(()),
            reply: Ok(serde_json::from_str(json).unwrap()),
        }
    }

    fn audio() -> SampleBuffer {
        SampleBuffer::new(vec![0.0; 16000], 16000)
    }

    // ─── Dispatch ───

    #[test]
    fn test_chunks_become_placeholder_segments_in_order() {
        let d = dispatcher(replying(
            r#"{"text": "a b", "chunks": [
                {"timestamp": [0.0, 1.0], "text": " first"},
                {"timestamp": [1.0, 2.5], "text": " second"}
            ]}"#,
        ));

        let segments = d.transcribe(audio(), &mut |_| {}).unwrap();

        assert_eq!(
            segments,
            vec![
                Segment::new(0.0, "first", DEFAULT_SPEAKER),
                Segment::new(1.0, "second", DEFAULT_SPEAKER),
            ]
        );
    }

    #[test]
    fn test_zero_chunks_with_text_yields_single_segment() {
        let d = dispatcher(replying(r#"{"text": " mumbled words ", "chunks": []}"#));

        let segments = d.transcribe(audio(), &mut |_| {}).unwrap();

        assert_eq!(segments, vec![Segment::unattributed(0.0, "mumbled words")]);
    }

    #[rstest]
    #[case::empty_text(r#"{"text": "", "chunks": []}"#)]
    #[case::whitespace_text(r#"{"text": "   "}"#)]
    #[case::nothing_at_all("{}")]
    fn test_zero_chunks_without_text_yields_placeholder(#[case] json: &str) {
        let d = dispatcher(replying(json));

        let segments = d.transcribe(audio(), &mut |_| {}).unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].timestamp, 0.0);
        assert_eq!(segments[0].text, NO_SPEECH_PLACEHOLDER);
        assert!(!segments[0].text.is_empty());
    }

    #[test]
    fn test_progress_is_forwarded() {
        let d = dispatcher(replying("{}"));
        let mut events = Vec::new();

        d.transcribe(audio(), &mut |e| events.push(e)).unwrap();

        assert!(events.contains(&ProgressEvent::Transcribing {
            message: "decoding".to_string()
        }));
    }

    #[test]
    fn test_engine_error_resets_worker() {
        let d = dispatcher(FixedEngine {
            load: Ok(()),
            reply: Err("bad input tensor".to_string()),
        });

        let result = d.transcribe(audio(), &mut |_| {});

        assert_eq!(
            result,
            Err(TranscriptionError::Engine("bad input tensor".to_string()))
        );
        assert_eq!(d.supervisor().state(), WorkerState::Uninitialized);
    }

    #[test]
    fn test_load_failure_resets_worker() {
        let d = dispatcher(FixedEngine {
            load: Err("weights corrupted".to_string()),
            reply: Ok(EngineOutput::default()),
        });

        let result = d.transcribe(audio(), &mut |_| {});

        assert_eq!(
            result,
            Err(TranscriptionError::Worker(WorkerError::Load(
                "weights corrupted".to_string()
            )))
        );
        assert_eq!(d.supervisor().state(), WorkerState::Uninitialized);
    }

    // ─── Normalization ───

    #[test]
    fn test_point_timestamps() {
        let output: EngineOutput =
            serde_json::from_str(r#"{"chunks": [{"timestamp": 4.5, "text": "x"}]}"#).unwrap();
        assert_eq!(normalize_output(output)[0].timestamp, 4.5);
    }

    #[test]
    fn test_missing_timestamp_inherits_previous() {
        let output: EngineOutput = serde_json::from_str(
            r#"{"chunks": [
                {"timestamp": [3.0, 4.0], "text": "a"},
                {"timestamp": [null, 5.0], "text": "b"},
                {"text": "c"}
            ]}"#,
        )
        .unwrap();
        let times: Vec<f64> = normalize_output(output)
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(times, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_negative_timestamp_clamped_to_zero() {
        let output: EngineOutput =
            serde_json::from_str(r#"{"chunks": [{"timestamp": -0.2, "text": "x"}]}"#).unwrap();
        assert_eq!(normalize_output(output)[0].timestamp, 0.0);
    }

    #[test]
    fn test_blank_chunks_are_skipped() {
        let output: EngineOutput = serde_json::from_str(
            r#"{"text": "whole", "chunks": [
                {"timestamp": 0.0, "text": "  "},
                {"timestamp": 1.0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(normalize_output(output), vec![Segment::unattributed(0.0, "whole")]);
    }
}
