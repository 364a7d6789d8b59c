/// Queue sizing and conversion tuning for one [`crate::channel::AudioChannel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Max encoded packets waiting for the decoder (0 = unbounded).
    pub packet_queue_depth: usize,
    /// Max decoded frames waiting for the playback driver (0 = unbounded).
    pub frame_queue_depth: usize,
    /// Frames handed to the rate converter per chunk.
    pub resample_chunk_frames: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            packet_queue_depth: 64,
            frame_queue_depth: 32,
            resample_chunk_frames: 1024,
        }
    }
}
