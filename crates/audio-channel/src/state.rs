//! Atomic Idle/Playing/Stopped state shared by the decoder and the playback driver.

use std::sync::atomic::{AtomicU8, Ordering};

pub use audio_channel_types::RunState;

const IDLE: u8 = 0;
const PLAYING: u8 = 1;
const STOPPED: u8 = 2;

/// Lock-free run state cell.
///
/// Only forward transitions exist; `Stopped` is terminal.
#[derive(Debug)]
pub struct RunStateCell(AtomicU8);

impl Default for RunStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    pub fn get(&self) -> RunState {
        match self.0.load(Ordering::Acquire) {
            IDLE => RunState::Idle,
            PLAYING => RunState::Playing,
            _ => RunState::Stopped,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.0.load(Ordering::Acquire) == PLAYING
    }

    /// `Idle -> Playing`. Returns `false` if the channel was not idle.
    pub fn start(&self) -> bool {
        self.0
            .compare_exchange(IDLE, PLAYING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Stopped`. Returns the state it replaced.
    pub fn stop(&self) -> RunState {
        match self.0.swap(STOPPED, Ordering::AcqRel) {
            IDLE => RunState::Idle,
            PLAYING => RunState::Playing,
            _ => RunState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_only_from_idle() {
        let s = RunStateCell::new();
        assert_eq!(s.get(), RunState::Idle);
        assert!(s.start());
        assert!(s.is_playing());
        assert!(!s.start());
    }

    #[test]
    fn stop_is_terminal() {
        let s = RunStateCell::new();
        assert!(s.start());
        assert_eq!(s.stop(), RunState::Playing);
        assert_eq!(s.get(), RunState::Stopped);
        assert!(!s.start());
        assert_eq!(s.stop(), RunState::Stopped);
        assert!(!s.is_playing());
    }
}
