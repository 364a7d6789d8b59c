//! Counters and notifications shared between the pipeline threads and the controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

pub use audio_channel_types::{ChannelEndReason, ChannelStatus};

use crate::decode::DecoderExit;

/// Notifications sent to the controller over the channel's event receiver.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// The decoder thread returned.
    DecoderExited(DecoderExit),
    /// Every frame was played and the converter tail has been handed to the sink.
    Drained,
    /// Playback stopped on a conversion or sink failure.
    PlaybackFailed(String),
}

/// Monotonic counters updated by the decoder and the playback driver.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    pub packets_submitted: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_played: AtomicU64,
    pub bytes_played: AtomicU64,
    /// Pulls that produced no bytes.
    pub empty_pulls: AtomicU64,
    end_reason: Mutex<Option<ChannelEndReason>>,
}

impl ChannelCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Record why the run ended. The first reason wins.
    pub fn record_end(&self, reason: ChannelEndReason) {
        let mut slot = self.end_reason.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            tracing::info!(reason = ?reason, "channel end reason recorded");
            *slot = Some(reason);
        }
    }

    pub fn end_reason(&self) -> Option<ChannelEndReason> {
        *self.end_reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the counters into `status`.
    pub fn fill(&self, status: &mut ChannelStatus) {
        status.packets_submitted = self.packets_submitted.load(Ordering::Relaxed);
        status.frames_decoded = self.frames_decoded.load(Ordering::Relaxed);
        status.frames_played = self.frames_played.load(Ordering::Relaxed);
        status.bytes_played = self.bytes_played.load(Ordering::Relaxed);
        status.empty_pulls = self.empty_pulls.load(Ordering::Relaxed);
        status.end_reason = self.end_reason();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_end_reason_wins() {
        let counters = ChannelCounters::default();
        counters.record_end(ChannelEndReason::DecodeError);
        counters.record_end(ChannelEndReason::Stopped);
        assert_eq!(counters.end_reason(), Some(ChannelEndReason::DecodeError));
    }

    #[test]
    fn fill_copies_counters() {
        let counters = ChannelCounters::default();
        ChannelCounters::add(&counters.packets_submitted, 3);
        ChannelCounters::add(&counters.frames_decoded, 5);
        ChannelCounters::add(&counters.bytes_played, 4096);
        ChannelCounters::add(&counters.empty_pulls, 1);

        let mut status = ChannelStatus::default();
        counters.fill(&mut status);
        assert_eq!(status.packets_submitted, 3);
        assert_eq!(status.frames_decoded, 5);
        assert_eq!(status.frames_played, 0);
        assert_eq!(status.bytes_played, 4096);
        assert_eq!(status.empty_pulls, 1);
        assert!(status.end_reason.is_none());
    }
}
