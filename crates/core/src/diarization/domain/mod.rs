pub mod batch;
pub mod speaker_assignment;
pub mod speaker_classifier;
