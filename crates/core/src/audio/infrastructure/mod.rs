#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_media_decoder;
