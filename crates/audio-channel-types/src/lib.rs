use serde::{Deserialize, Serialize};

/// Lifecycle of one audio channel.
///
/// Transitions only move forward: `Idle -> Playing -> Stopped`, or straight
/// from `Idle` to `Stopped` when a channel is torn down before it ever played.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, queues idle, no threads running.
    #[default]
    Idle,
    /// Decoder thread running and the sink pulling audio.
    Playing,
    /// Terminal; every loop has been asked to unwind.
    Stopped,
}

/// Reason why a channel stopped producing audio.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEndReason {
    /// Input closed and every decoded frame was played.
    Eof,
    /// Explicitly stopped by the controller.
    Stopped,
    /// The codec reported an unrecoverable error.
    DecodeError,
    /// The playback side (resampler or sink) failed.
    PlaybackError,
}

/// Point-in-time status of a channel.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelStatus {
    /// Current lifecycle state.
    pub state: RunState,
    /// Playback position in seconds of the last consumed frame, `None` before the first pull.
    pub relative_time_secs: Option<f64>,
    /// Source sample rate (Hz).
    pub source_rate_hz: Option<u32>,
    /// Source channel count.
    pub source_channels: Option<u16>,
    /// Source sample format label.
    pub source_format: Option<String>,
    /// Output sample rate (Hz).
    pub output_rate_hz: u32,
    /// Output channel count.
    pub output_channels: u16,
    /// Encoded packets waiting to be decoded.
    pub queued_packets: usize,
    /// Decoded frames waiting to be played.
    pub queued_frames: usize,
    /// Packets handed to the codec.
    pub packets_submitted: u64,
    /// Frames produced by the codec.
    pub frames_decoded: u64,
    /// Frames consumed by the playback driver.
    pub frames_played: u64,
    /// PCM bytes handed to the sink.
    pub bytes_played: u64,
    /// Pulls that returned no audio while playing.
    pub empty_pulls: u64,
    /// Set once the channel has ended.
    pub end_reason: Option<ChannelEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_serializes_snake_case() {
        let json = serde_json::to_string(&RunState::Playing).unwrap();
        assert_eq!(json, "\"playing\"");
    }

    #[test]
    fn end_reason_roundtrips() {
        let json = serde_json::to_string(&ChannelEndReason::DecodeError).unwrap();
        assert_eq!(json, "\"decode_error\"");
        let back: ChannelEndReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelEndReason::DecodeError);
    }

    #[test]
    fn default_status_is_idle_without_clock() {
        let status = ChannelStatus::default();
        assert_eq!(status.state, RunState::Idle);
        assert!(status.relative_time_secs.is_none());
        assert!(status.end_reason.is_none());
    }
}
