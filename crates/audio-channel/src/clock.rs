//! Playback position of the audio stream.

use std::sync::atomic::{AtomicU64, Ordering};

/// Bit pattern meaning "no frame consumed yet".
const UNSET: u64 = u64::MAX;

/// Lock-free clock written by the playback driver and read by sync logic.
///
/// Holds the presentation time (seconds) of the last consumed frame. The value
/// never moves backwards, and stays at the last known position while the stream
/// starves or stops.
#[derive(Debug)]
pub struct PlaybackClock {
    bits: AtomicU64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(UNSET),
        }
    }

    /// Seconds of the last consumed frame, `None` before playback produced anything.
    pub fn relative_time(&self) -> Option<f64> {
        match self.bits.load(Ordering::Acquire) {
            UNSET => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    /// Record a newly consumed frame's time. Earlier or non-finite values are ignored.
    pub fn advance(&self, secs: f64) {
        if !secs.is_finite() {
            return;
        }
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if cur == UNSET || secs > f64::from_bits(cur) {
                    Some(secs.to_bits())
                } else {
                    None
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_until_first_advance() {
        let clock = PlaybackClock::new();
        assert!(clock.relative_time().is_none());
        clock.advance(0.0);
        assert_eq!(clock.relative_time(), Some(0.0));
    }

    #[test]
    fn never_moves_backwards() {
        let clock = PlaybackClock::new();
        clock.advance(1.5);
        clock.advance(1.0);
        assert_eq!(clock.relative_time(), Some(1.5));
        clock.advance(2.25);
        assert_eq!(clock.relative_time(), Some(2.25));
    }

    #[test]
    fn ignores_non_finite() {
        let clock = PlaybackClock::new();
        clock.advance(f64::NAN);
        assert!(clock.relative_time().is_none());
    }
}
