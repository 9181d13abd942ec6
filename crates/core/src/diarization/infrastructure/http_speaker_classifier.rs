use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diarization::domain::speaker_assignment::SpeakerAssignment;
use crate::diarization::domain::speaker_classifier::{DiarizationError, SpeakerClassifier};
use crate::transcription::domain::segment::Segment;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    segments: &'a [Segment],
}

#[derive(Debug, Default, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    segments: Option<Vec<ClassifiedSegment>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifiedSegment {
    #[serde(default)]
    speaker: Option<String>,
}

/// Speaker classifier backed by an HTTP JSON endpoint.
///
/// POSTs `{"segments": [...]}` and expects `{"segments": [...]}` back with
/// speaker fields rewritten, or `{"error": "..."}`. Each request is bounded
/// by the client timeout.
pub struct HttpSpeakerClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpSpeakerClassifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, DiarizationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiarizationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SpeakerClassifier for HttpSpeakerClassifier {
    fn classify(&self, batch: &[Segment]) -> Result<Vec<SpeakerAssignment>, DiarizationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest { segments: batch })
            .send()
            .map_err(|e| DiarizationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| DiarizationError::Transport(e.to_string()))?;

        if !status.is_success() {
            // Prefer the service's own explanation when it sent one.
            return Err(serde_json::from_str::<ClassifyResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map(DiarizationError::Service)
                .unwrap_or(DiarizationError::Status(status.as_u16())));
        }

        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<Vec<SpeakerAssignment>, DiarizationError> {
    let response: ClassifyResponse =
        serde_json::from_str(body).map_err(|e| DiarizationError::Decode(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(DiarizationError::Service(error));
    }
    let segments = response
        .segments
        .ok_or_else(|| DiarizationError::Decode("response has no segments".to_string()))?;

    Ok(segments
        .into_iter()
        .enumerate()
        .filter_map(|(index, s)| {
            let speaker = s.speaker?;
            let speaker = speaker.trim();
            (!speaker.is_empty()).then(|| SpeakerAssignment::new(index, speaker))
        })
        .collect())
}
