use crate::transcription::domain::segment::Segment;

/// A contiguous run of segments sent to the classifier in one call.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub index: usize,
    /// Position of the first segment in the full transcript.
    pub start: usize,
    pub segments: Vec<Segment>,
    /// Added to numbered speaker labels the classifier returns for this batch.
    pub speaker_offset: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Number of batches needed for `len` segments.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}
