/// Mono `f32` samples at the engine's sample rate.
///
/// Deliberately not `Clone`: the buffer is moved into the worker request so a
/// long recording is never held twice in memory.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
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

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_secs() {
        let buffer = SampleBuffer::new(vec![0.0; 48000], 16000);
        assert_eq!(buffer.duration_secs(), 3.0);
        assert_eq!(buffer.len(), 48000);
    }

    #[test]
    fn test_into_samples_hands_over_storage() {
        let buffer = SampleBuffer::new(vec![0.25; 4], 16000);
        let ptr = buffer.samples().as_ptr();
        let samples = buffer.into_samples();
        assert_eq!(samples.as_ptr(), ptr);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = SampleBuffer::new(Vec::new(), 16000);
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration_secs(), 0.0);
    }
}
