use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::audio::domain::container_hint::ContainerHint;
use crate::audio::domain::media_decoder::MediaDecoder;
use crate::audio::domain::pcm_audio::PcmAudio;
use crate::audio::domain::preprocess_error::PreprocessError;
use crate::audio::domain::resampling::{downmix_to_mono, downsample};
use crate::audio::domain::sample_buffer::SampleBuffer;
use crate::shared::cancellation::CancellationToken;
use crate::shared::constants::{DECODE_TIMEOUT, TARGET_SAMPLE_RATE};

/// Turns uploaded media bytes into the mono buffer the engine consumes.
///
/// Decoding happens on a helper thread bounded by a wall-clock timeout, so a
/// decoder that hangs on a malformed or huge file cannot stall the job. When
/// the timeout fires the decoder is cancelled and left to wind down.
pub struct AudioPreprocessor {
    decoder: Arc<dyn MediaDecoder>,
    target_rate: u32,
    decode_timeout: Duration,
}

impl AudioPreprocessor {
    pub fn new(decoder: Arc<dyn MediaDecoder>) -> Self {
        Self {
            decoder,
            target_rate: TARGET_SAMPLE_RATE,
            decode_timeout: DECODE_TIMEOUT,
        }
    }

    pub fn with_target_rate(mut self, target_rate: u32) -> Self {
        self.target_rate = target_rate;
        self
    }

    pub fn with_decode_timeout(mut self, decode_timeout: Duration) -> Self {
        self.decode_timeout = decode_timeout;
        self
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn decode(
        &self,
        bytes: Vec<u8>,
        hint: &ContainerHint,
    ) -> Result<SampleBuffer, PreprocessError> {
        log::debug!(
            "Decoding {} bytes ({}, {})",
            bytes.len(),
            hint.extension.as_deref().unwrap_or("unknown container"),
            if hint.is_video() { "video" } else { "audio" }
        );

        let pcm = self
            .decode_with_timeout(bytes, hint)?
            .ok_or(PreprocessError::NoAudioTrack)?;
        let input_rate = pcm.sample_rate();
        let channels = pcm.channels();
        if channels == 0 {
            return Err(PreprocessError::Decode(
                "decoded audio has no channels".to_string(),
            ));
        }

        let mono = if channels == 1 {
            pcm.into_samples()
        } else {
            downmix_to_mono(&pcm)
        };

        let samples = if input_rate == self.target_rate {
            mono
        } else {
            downsample(&mono, input_rate, self.target_rate)?
        };

        log::info!(
            "Preprocessed audio: {channels} ch @ {input_rate} Hz -> mono @ {} Hz, {:.1}s",
            self.target_rate,
            samples.len() as f64 / self.target_rate as f64
        );

        Ok(SampleBuffer::new(samples, self.target_rate))
    }

    fn decode_with_timeout(
        &self,
        bytes: Vec<u8>,
        hint: &ContainerHint,
    ) -> Result<Option<PcmAudio>, PreprocessError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let decoder = Arc::clone(&self.decoder);
        let hint = hint.clone();
        let cancel = CancellationToken::new();
        let decoder_cancel = cancel.clone();

        thread::Builder::new()
            .name("media-decode".to_string())
            .spawn(move || {
                let result = decoder.decode(&bytes, &hint, &decoder_cancel);
                // The receiver is gone if the wait already timed out.
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(self.decode_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                log::warn!(
                    "Decoding cancelled after {:.0}s",
                    self.decode_timeout.as_secs_f64()
                );
                Err(PreprocessError::DecodeTimeout(self.decode_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PreprocessError::Decode(
                "decoder stopped without producing a result".to_string(),
            )),
        }
    }
}
