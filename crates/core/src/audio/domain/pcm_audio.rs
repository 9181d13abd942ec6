/// Decoded audio: interleaved PCM samples normalized to [-1.0, 1.0] at the
/// source's native rate and channel count.
#[derive(Clone, Debug)]
pub struct PcmAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl PcmAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_fields() {
        let pcm = PcmAudio::new(vec![0.0; 8], 44100, 2);
        assert_eq!(pcm.samples().len(), 8);
        assert_eq!(pcm.sample_rate(), 44100);
        assert_eq!(pcm.channels(), 2);
    }

    #[test]
    fn test_frames_stereo() {
        let pcm = PcmAudio::new(vec![0.0; 96000], 48000, 2);
        assert_eq!(pcm.frames(), 48000);
        assert_eq!(pcm.duration(), 1.0);
    }

    #[test]
    fn test_zero_channels_has_no_frames() {
        let pcm = PcmAudio::new(vec![0.0; 10], 16000, 0);
        assert_eq!(pcm.frames(), 0);
    }
}
