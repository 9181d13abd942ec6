use super::container_hint::ContainerHint;
use super::pcm_audio::PcmAudio;
use super::preprocess_error::PreprocessError;
use crate::shared::cancellation::CancellationToken;

/// Domain interface for turning an uploaded container into PCM.
pub trait MediaDecoder: Send + Sync {
    /// Decode the best audio track at its native rate and channel count.
    /// Returns None if the container has no audio track.
    ///
    /// Once `cancel` is set nobody waits for the result any more; decoders
    /// should stop as soon as they notice.
    fn decode(
        &self,
        bytes: &[u8],
        hint: &ContainerHint,
        cancel: &CancellationToken,
    ) -> Result<Option<PcmAudio>, PreprocessError>;
}
