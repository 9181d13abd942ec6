use std::time::Instant;

use crate::audio::domain::container_hint::ContainerHint;
use crate::audio::preprocessor::AudioPreprocessor;
use crate::diarization::stitcher::DiarizationStitcher;
use crate::pipeline::job_error::JobError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::progress::ProgressEvent;
use crate::transcription::dispatcher::TranscriptionDispatcher;
use crate::transcription::domain::segment::Segment;

/// Decode → transcribe → (optionally) attribute speakers, for one file.
pub struct TranscribeMediaUseCase {
    preprocessor: AudioPreprocessor,
    dispatcher: TranscriptionDispatcher,
    stitcher: Option<DiarizationStitcher>,
}

impl TranscribeMediaUseCase {
    pub fn new(
        preprocessor: AudioPreprocessor,
        dispatcher: TranscriptionDispatcher,
        stitcher: Option<DiarizationStitcher>,
    ) -> Self {
        Self {
            preprocessor,
            dispatcher,
            stitcher,
        }
    }

    pub fn run(
        &self,
        bytes: Vec<u8>,
        hint: &ContainerHint,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Vec<Segment>, JobError> {
        logger.progress(&ProgressEvent::Decoding);
        let started = Instant::now();
        let audio = self.preprocessor.decode(bytes, hint);
        logger.timing("decode", elapsed_ms(started));
        let audio = audio?;
        logger.metric("audio_seconds", audio.duration_secs());

        let started = Instant::now();
        let segments = self
            .dispatcher
            .transcribe(audio, &mut |event| logger.progress(&event));
        logger.timing("transcribe", elapsed_ms(started));
        let segments = segments?;
        logger.metric("segments", segments.len() as f64);

        let segments = match &self.stitcher {
            Some(stitcher) => {
                let started = Instant::now();
                let segments = stitcher.diarize(segments, &mut |event| logger.progress(&event));
                logger.timing("diarize", elapsed_ms(started));
                segments
            }
            None => segments,
        };

        logger.summary();
        Ok(segments)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
