pub mod container_hint;
pub mod media_decoder;
pub mod pcm_audio;
pub mod preprocess_error;
pub mod resampling;
pub mod sample_buffer;
