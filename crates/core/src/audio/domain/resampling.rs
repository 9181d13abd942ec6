use super::pcm_audio::PcmAudio;
use super::preprocess_error::PreprocessError;

/// Average interleaved channels into one.
///
/// Output has one sample per frame; each is the arithmetic mean of that
/// frame's channel samples, so content present on any channel survives.
pub fn downmix_to_mono(audio: &PcmAudio) -> Vec<f32> {
    let channels = audio.channels() as usize;
    if channels <= 1 {
        return audio.samples().to_vec();
    }

    let scale = 1.0 / channels as f32;
    audio
        .samples()
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Reduce `samples` from `input_rate` to `output_rate` by block averaging.
///
/// Output sample `i` is the mean of every input sample `j` with
/// `i * ratio <= j < (i + 1) * ratio`, where `ratio = input_rate / output_rate`.
/// Runs in a single pass and allocates only the output.
pub fn downsample(
    samples: &[f32],
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>, PreprocessError> {
    if input_rate == 0 || output_rate == 0 {
        return Err(PreprocessError::Decode(format!(
            "invalid sample rate {input_rate} Hz"
        )));
    }
    if input_rate == output_rate {
        return Ok(samples.to_vec());
    }
    if input_rate < output_rate {
        return Err(PreprocessError::UnsupportedSampleRate {
            input: input_rate,
            target: output_rate,
        });
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let len = samples.len();
    let out_len = (len as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let start = ((i as f64 * ratio).ceil() as usize).min(len);
        let end = (((i + 1) as f64 * ratio).ceil() as usize).min(len);
        if start >= end {
            // Rounding can leave the last window empty.
            out.push(samples[start.min(len - 1)]);
            continue;
        }
        let window = &samples[start..end];
        let sum: f64 = window.iter().map(|&s| s as f64).sum();
        out.push((sum / window.len() as f64) as f32);
    }

    Ok(out)
}
