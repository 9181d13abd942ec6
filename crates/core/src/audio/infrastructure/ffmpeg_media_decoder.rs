use std::io::Write;

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::frame::audio::Audio as AudioFrame;
use ffmpeg_next::ChannelLayout;

use crate::audio::domain::container_hint::ContainerHint;
use crate::audio::domain::media_decoder::MediaDecoder;
use crate::audio::domain::pcm_audio::PcmAudio;
use crate::audio::domain::preprocess_error::PreprocessError;
use crate::shared::cancellation::CancellationToken;

/// Decodes uploaded audio or video containers using ffmpeg-next.
///
/// Frames are converted to packed `f32` but keep their native rate and
/// channel layout; downmixing and decimation happen in the preprocessor.
/// Cancellation interrupts blocking demuxer I/O and is checked per packet.
#[derive(Debug, Default)]
pub struct FfmpegMediaDecoder;

impl FfmpegMediaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl MediaDecoder for FfmpegMediaDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        hint: &ContainerHint,
        cancel: &CancellationToken,
    ) -> Result<Option<PcmAudio>, PreprocessError> {
        ffmpeg_next::init().map_err(ffmpeg_error)?;

        // ffmpeg demuxes from a path; the temp file is removed when `spool`
        // drops, on success and on every error path.
        let mut spool = tempfile::Builder::new()
            .prefix("voxscribe-")
            .suffix(&hint.file_suffix())
            .tempfile()?;
        spool.write_all(bytes)?;
        spool.flush()?;

        let interrupt = cancel.clone();
        let mut ictx =
            ffmpeg_next::format::input_with_interrupt(spool.path(), move || {
                interrupt.is_cancelled()
            })
            .map_err(ffmpeg_error)?;

        let audio_stream = match ictx.streams().best(ffmpeg_next::media::Type::Audio) {
            Some(stream) => stream,
            None => return Ok(None),
        };
        let audio_stream_index = audio_stream.index();

        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(audio_stream.parameters())
                .map_err(ffmpeg_error)?;
        let mut decoder = codec_ctx.decoder().audio().map_err(ffmpeg_error)?;

        let channels = decoder.channels() as u16;
        let sample_rate = decoder.rate();
        if channels == 0 || sample_rate == 0 {
            return Err(PreprocessError::Decode(format!(
                "audio stream reports {channels} channel(s) at {sample_rate} Hz"
            )));
        }

        let layout = if decoder.channel_layout().is_empty() {
            ChannelLayout::default(channels as i32)
        } else {
            decoder.channel_layout()
        };

        let mut converter = resampling::Context::get(
            decoder.format(),
            layout,
            sample_rate,
            Sample::F32(SampleType::Packed),
            layout,
            sample_rate,
        )
        .map_err(ffmpeg_error)?;

        let mut samples: Vec<f32> = Vec::new();
        let mut decoded = AudioFrame::empty();
        let mut converted = AudioFrame::empty();

        for (stream, packet) in ictx.packets() {
            if cancel.is_cancelled() {
                return Err(PreprocessError::Decode("decoding cancelled".to_string()));
            }
            if stream.index() != audio_stream_index {
                continue;
            }
            decoder.send_packet(&packet).map_err(ffmpeg_error)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                converter
                    .run(&decoded, &mut converted)
                    .map_err(ffmpeg_error)?;
                extract_packed_f32(&converted, channels, &mut samples);
            }
        }

        decoder.send_eof().map_err(ffmpeg_error)?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            converter
                .run(&decoded, &mut converted)
                .map_err(ffmpeg_error)?;
            extract_packed_f32(&converted, channels, &mut samples);
        }

        if let Ok(Some(delay)) = converter.flush(&mut converted) {
            if delay.output > 0 {
                extract_packed_f32(&converted, channels, &mut samples);
            }
        }

        log::debug!(
            "Decoded {} frames ({channels} ch @ {sample_rate} Hz)",
            samples.len() / channels as usize
        );

        Ok(Some(PcmAudio::new(samples, sample_rate, channels)))
    }
}

fn ffmpeg_error(e: ffmpeg_next::Error) -> PreprocessError {
    PreprocessError::Decode(e.to_string())
}

/// Append the interleaved samples of a packed `f32` frame.
fn extract_packed_f32(frame: &AudioFrame, channels: u16, out: &mut Vec<f32>) {
    let count = frame.samples() * channels as usize;
    if count == 0 {
        return;
    }
    let data = frame.data(0);
    let available = data.len() / std::mem::size_of::<f32>();
    let count = count.min(available);
    // SAFETY: plane 0 of a packed F32 frame holds `samples * channels` f32
    // values; `count` never exceeds the plane's byte length.
    let floats = unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, count) };
    out.extend_from_slice(floats);
}
