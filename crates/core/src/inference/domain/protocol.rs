use serde::{Deserialize, Serialize};

use crate::audio::domain::sample_buffer::SampleBuffer;

/// Request posted to the worker context.
#[derive(Debug)]
pub enum WorkerRequest {
    Load,
    /// The buffer moves into the worker; the caller cannot touch it again.
    Transcribe { audio: SampleBuffer },
}

#[derive(Debug)]
pub struct WorkerCommand {
    pub request_id: u64,
    pub request: WorkerRequest,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineProgress {
    pub message: String,
    pub percent: Option<f32>,
}

impl EngineProgress {
    pub fn phase(message: &str) -> Self {
        Self {
            message: message.to_string(),
            percent: None,
        }
    }

    pub fn percent(message: &str, percent: f32) -> Self {
        Self {
            message: message.to_string(),
            percent: Some(percent),
        }
    }
}

/// Notification sent back by the worker context.
///
/// `Load` answers with progress then `Ready` or `Error`; `Transcribe` with
/// progress then `Complete` or `Error`. `Fault` is context-level and is not
/// tied to a request.
#[derive(Debug)]
pub enum WorkerEvent {
    Progress(EngineProgress),
    Ready,
    Complete { output: EngineOutput },
    Error { message: String },
    Fault { message: String },
}

#[derive(Debug)]
pub struct WorkerReply {
    /// Request this reply answers; `None` for context-level faults.
    pub request_id: Option<u64>,
    pub event: WorkerEvent,
}

impl WorkerReply {
    pub fn to(request_id: u64, event: WorkerEvent) -> Self {
        Self {
            request_id: Some(request_id),
            event,
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            request_id: None,
            event: WorkerEvent::Fault {
                message: message.into(),
            },
        }
    }
}

/// Raw engine result. Every field is optional: engines disagree on shape
/// and the dispatcher normalizes whatever arrives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub chunks: Option<Vec<EngineChunk>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineChunk {
    #[serde(default)]
    pub timestamp: Option<ChunkTimestamp>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Chunk start time: a bare number of seconds or a `[start, end]` pair,
/// either end of which may be null.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkTimestamp {
    Point(f64),
    Range(Option<f64>, Option<f64>),
}

impl ChunkTimestamp {
    pub fn start(&self) -> Option<f64> {
        match *self {
            ChunkTimestamp::Point(t) => Some(t),
            ChunkTimestamp::Range(start, _) => start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_with_range_timestamps() {
        let json = r#"{
            "text": " hello there",
            "chunks": [
                {"timestamp": [0.0, 1.5], "text": " hello"},
                {"timestamp": [1.5, null], "text": " there"}
            ]
        }"#;
        let output: EngineOutput = serde_json::from_str(json).unwrap();
        let chunks = output.chunks.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].timestamp.unwrap().start(), Some(0.0));
        assert_eq!(
            chunks[1].timestamp,
            Some(ChunkTimestamp::Range(Some(1.5), None))
        );
    }

    #[test]
    fn test_output_with_point_timestamp() {
        let json = r#"{"chunks": [{"timestamp": 2.25, "text": "hi"}]}"#;
        let output: EngineOutput = serde_json::from_str(json).unwrap();
        assert!(output.text.is_none());
        assert_eq!(
            output.chunks.unwrap()[0].timestamp.unwrap().start(),
            Some(2.25)
        );
    }

    #[test]
    fn test_output_tolerates_missing_fields() {
        let output: EngineOutput = serde_json::from_str("{}").unwrap();
        assert_eq!(output, EngineOutput::default());

        let chunk: EngineChunk = serde_json::from_str(r#"{"text": "x"}"#).unwrap();
        assert!(chunk.timestamp.is_none());
    }

    #[test]
    fn test_range_with_null_start() {
        let ts: ChunkTimestamp = serde_json::from_str("[null, 3.0]").unwrap();
        assert_eq!(ts.start(), None);
    }

    #[test]
    fn test_fault_reply_has_no_request() {
        let reply = WorkerReply::fault("boom");
        assert!(reply.request_id.is_none());
        assert!(matches!(reply.event, WorkerEvent::Fault { ref message } if message == "boom"));
    }
}
