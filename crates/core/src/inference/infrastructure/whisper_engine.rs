use std::path::PathBuf;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::domain::sample_buffer::SampleBuffer;
use crate::inference::domain::protocol::{
    ChunkTimestamp, EngineChunk, EngineOutput, EngineProgress,
};
use crate::inference::domain::speech_engine::{
    EngineError, ProgressSink, SpeechEngine, SpeechEngineFactory,
};
use crate::shared::cancellation::CancellationToken;
use crate::shared::constants::TARGET_SAMPLE_RATE;
use crate::shared::model_store::ModelStore;

/// Where the ggml weights come from.
#[derive(Clone, Debug)]
pub enum ModelSource {
    /// A file the user already has.
    Path(PathBuf),
    /// Looked up in the model store and downloaded on first use.
    Store {
        store: ModelStore,
        name: String,
        url: String,
    },
}

/// Speech engine using whisper.cpp via whisper-rs.
///
/// `load` resolves (and if needed downloads) the model and builds the
/// context; `transcribe` returns one chunk per Whisper segment. whisper.cpp
/// polls the cancel token between decoder steps and reports percent done.
pub struct WhisperEngine {
    source: ModelSource,
    language: String,
    threads: usize,
    context: Option<WhisperContext>,
}

impl WhisperEngine {
    pub fn new(source: ModelSource, language: &str) -> Self {
        Self {
            source,
            language: language.to_string(),
            threads: num_cpus().min(4),
            context: None,
        }
    }

    fn resolve_model(
        &self,
        progress: &mut dyn FnMut(EngineProgress),
    ) -> Result<PathBuf, EngineError> {
        match &self.source {
            ModelSource::Path(path) => {
                if !path.exists() {
                    return Err(format!("Whisper model not found at: {}", path.display()).into());
                }
                Ok(path.clone())
            }
            ModelSource::Store { store, name, url } => {
                progress(EngineProgress::phase("resolving model"));
                store
                    .resolve(name, url, &mut |downloaded, total| {
                        if total > 0 {
                            let pct = downloaded as f32 / total as f32 * 100.0;
                            progress(EngineProgress::percent("downloading model", pct));
                        }
                    })
                    .map_err(|e| EngineError(e.to_string()))
            }
        }
    }
}

impl SpeechEngine for WhisperEngine {
    fn load(&mut self, progress: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError> {
        let model_path = self.resolve_model(progress)?;

        progress(EngineProgress::phase("initializing model"));
        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        log::info!("Whisper model loaded from {}", model_path.display());
        self.context = Some(ctx);
        Ok(())
    }

    fn transcribe(
        &mut self,
        audio: SampleBuffer,
        cancel: &CancellationToken,
        progress: ProgressSink,
    ) -> Result<EngineOutput, EngineError> {
        let ctx = self.context.as_ref().ok_or("Whisper model is not loaded")?;
        if audio.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(format!(
                "Whisper expects {TARGET_SAMPLE_RATE} Hz audio, got {} Hz",
                audio.sample_rate()
            )
            .into());
        }

        let mut state = ctx
            .create_state()
            .map_err(|e| format!("Failed to create Whisper state: {e}"))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_str()));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_n_threads(self.threads as i32);

        let abort_token = cancel.clone();
        let abort: Box<dyn FnMut() -> bool> = Box::new(move || abort_token.is_cancelled());
        params.set_abort_callback_safe::<_, Box<dyn FnMut() -> bool>>(Some(abort));

        let percent_sink = progress.clone();
        let on_percent: Box<dyn FnMut(i32)> = Box::new(move |percent| {
            percent_sink(EngineProgress::percent("transcribing", percent as f32))
        });
        params.set_progress_callback_safe::<_, Box<dyn FnMut(i32)>>(Some(on_percent));

        progress(EngineProgress::phase(&format!(
            "running inference on {:.0}s of audio",
            audio.duration_secs()
        )));
        let samples = audio.into_samples();
        let result = state.full(params, &samples);
        drop(samples);
        if cancel.is_cancelled() {
            return Err("Whisper inference cancelled".into());
        }
        result.map_err(|e| format!("Whisper inference failed: {e}"))?;

        let mut chunks = Vec::new();
        let mut full_text = String::new();
        let num_segments = state.full_n_segments();

        for seg_idx in 0..num_segments {
            let segment = match state.get_segment(seg_idx) {
                Some(s) => s,
                None => continue,
            };
            let text = match segment.to_str() {
                Ok(t) => t.trim().to_string(),
                Err(_) => continue,
            };
            if text.is_empty() {
                continue;
            }

            // Segment timestamps are in centiseconds (10ms units)
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = segment.end_timestamp() as f64 / 100.0;

            if !full_text.is_empty() {
                full_text.push(' ');
            }
            full_text.push_str(&text);
            chunks.push(EngineChunk {
                timestamp: Some(ChunkTimestamp::Range(Some(start), Some(end))),
                text: Some(text),
            });
        }

        Ok(EngineOutput {
            text: Some(full_text),
            chunks: Some(chunks),
        })
    }
}

/// Hands each worker context its own [`WhisperEngine`].
pub struct WhisperEngineFactory {
    source: ModelSource,
    language: String,
}

impl WhisperEngineFactory {
    pub fn new(source: ModelSource, language: &str) -> Self {
        Self {
            source,
            language: language.to_string(),
        }
    }
}

impl SpeechEngineFactory for WhisperEngineFactory {
    fn create(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
        Ok(Box::new(WhisperEngine::new(
            self.source.clone(),
            &self.language,
        )))
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_load_nonexistent_path_returns_error() {
        let mut engine = WhisperEngine::new(
            ModelSource::Path(PathBuf::from("/nonexistent/model.bin")),
            "en",
        );
        let err = engine.load(&mut |_| {}).unwrap_err();
        assert!(
            err.to_string().contains("not found"),
            "Expected 'not found' in error, got: {err}"
        );
    }

    #[test]
    fn test_transcribe_before_load_returns_error() {
        let mut engine = WhisperEngine::new(
            ModelSource::Path(PathBuf::from("/nonexistent/model.bin")),
            "en",
        );
        let result = engine.transcribe(
            SampleBuffer::new(vec![0.0; 16000], 16000),
            &CancellationToken::new(),
            Arc::new(|_| {}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_factory_creates_independent_engines() {
        let factory = WhisperEngineFactory::new(
            ModelSource::Path(PathBuf::from("/nonexistent/model.bin")),
            "en",
        );
        assert!(factory.create().is_ok());
        assert!(factory.create().is_ok());
    }

    #[test]
    #[ignore] // Requires whisper model download
    fn test_transcribe_does_not_crash_on_sine_wave() {
        let store = ModelStore::default_location().expect("no model dir");
        let mut engine = WhisperEngine::new(
            ModelSource::Store {
                store,
                name: crate::shared::constants::WHISPER_MODEL_NAME.to_string(),
                url: crate::shared::constants::WHISPER_MODEL_URL.to_string(),
            },
            "en",
        );
        engine.load(&mut |_| {}).expect("Failed to load model");

        let samples: Vec<f32> = (0..3 * TARGET_SAMPLE_RATE as usize)
            .map(|i| {
                let t = i as f64 / TARGET_SAMPLE_RATE as f64;
                (2.0 * std::f64::consts::PI * 440.0 * t).sin() as f32
            })
            .collect();
        let percents = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = percents.clone();
        let result = engine.transcribe(
            SampleBuffer::new(samples, TARGET_SAMPLE_RATE),
            &CancellationToken::new(),
            Arc::new(move |p: EngineProgress| seen.lock().unwrap().extend(p.percent)),
        );
        assert!(result.is_ok(), "Transcription should not error: {result:?}");
        assert!(!percents.lock().unwrap().is_empty());
    }

    #[test]
    #[ignore] // Requires whisper model download
    fn test_cancelled_transcription_returns_error() {
        let store = ModelStore::default_location().expect("no model dir");
        let mut engine = WhisperEngine::new(
            ModelSource::Store {
                store,
                name: crate::shared::constants::WHISPER_MODEL_NAME.to_string(),
                url: crate::shared::constants::WHISPER_MODEL_URL.to_string(),
            },
            "en",
        );
        engine.load(&mut |_| {}).expect("Failed to load model");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.transcribe(
            SampleBuffer::new(vec![0.0; 30 * TARGET_SAMPLE_RATE as usize], TARGET_SAMPLE_RATE),
            &cancel,
            Arc::new(|_| {}),
        );
        assert!(result.unwrap_err().to_string().contains("cancelled"));
    }
}
