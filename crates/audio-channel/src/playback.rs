//! Playback driver: serves the sink's pull callback.
//!
//! Each pull takes one decoded frame, converts it into the reusable output buffer
//! and advances the playback clock. The driver and its resampler live on the sink's
//! callback thread only, so nothing here is locked.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::clock::PlaybackClock;
use crate::error::Error;
use crate::format::{OUTPUT_SPEC, TimeBase, ticks_to_seconds};
use crate::frame::{DecodedFrame, EncodedPacket};
use crate::queue::BlockingQueue;
use crate::resample::Resampler;
use crate::sink::PullCallback;
use crate::state::RunStateCell;
use crate::status::{ChannelCounters, ChannelEndReason, ChannelEvent};

/// Shared handles the driver reads from and reports to.
#[derive(Clone)]
pub struct DriverContext {
    pub packets: Arc<BlockingQueue<EncodedPacket>>,
    pub frames: Arc<BlockingQueue<DecodedFrame>>,
    pub state: Arc<RunStateCell>,
    pub clock: Arc<PlaybackClock>,
    pub counters: Arc<ChannelCounters>,
    pub events: Sender<ChannelEvent>,
}

pub struct PlaybackDriver {
    ctx: DriverContext,
    time_base: TimeBase,
    resampler: Resampler,
    /// One second of output.
    buffer: Vec<u8>,
    drained: bool,
}

impl PlaybackDriver {
    pub fn new(ctx: DriverContext, time_base: TimeBase, resampler: Resampler) -> Self {
        Self {
            ctx,
            time_base,
            resampler,
            buffer: vec![0u8; OUTPUT_SPEC.bytes_per_second()],
            drained: false,
        }
    }

    /// Produce the next block of output, returning its length in bytes.
    ///
    /// Blocks until a frame is available or the frame queue is deactivated. Returns 0
    /// when the channel is not playing or nothing is left to play.
    pub fn pull(&mut self) -> usize {
        let frame = self.ctx.frames.pop();
        if !self.ctx.state.is_playing() {
            drop(frame);
            return 0;
        }
        let Some(frame) = frame else {
            return self.drain_tail();
        };

        if self.resampler.input_spec() != Some(frame.spec()) {
            tracing::info!(
                rate_hz = frame.spec().rate,
                channels = frame.spec().channel_count(),
                format = %frame.spec().format,
                "input format changed; reconfiguring resampler"
            );
            if let Err(e) = self.resampler.configure(frame.spec()) {
                return self.fail(e);
            }
        }

        let converted = match self.resampler.convert(Some(&frame), &mut self.buffer) {
            Ok(c) => c,
            Err(e) => return self.fail(e),
        };
        self.ctx.clock.advance(ticks_to_seconds(frame.pts, self.time_base));

        let counters = &self.ctx.counters;
        ChannelCounters::add(&counters.frames_played, 1);
        ChannelCounters::add(&counters.bytes_played, converted.bytes as u64);
        if converted.bytes == 0 {
            ChannelCounters::add(&counters.empty_pulls, 1);
        }
        tracing::trace!(pts = frame.pts, bytes = converted.bytes, "frame played");
        converted.bytes
    }

    /// Bytes produced by the last [`Self::pull`].
    pub fn output(&self, len: usize) -> &[u8] {
        &self.buffer[..len.min(self.buffer.len())]
    }

    /// Wrap the driver into the callback a [`crate::sink::Sink`] invokes.
    pub fn into_pull_callback(mut self) -> PullCallback {
        Box::new(move |queue| {
            let len = self.pull();
            if len > 0 {
                queue.enqueue(self.output(len));
            }
        })
    }

    /// Emit the converter tail once the frame queue is exhausted.
    fn drain_tail(&mut self) -> usize {
        if self.drained {
            ChannelCounters::add(&self.ctx.counters.empty_pulls, 1);
            return 0;
        }
        self.drained = true;

        let bytes = if self.resampler.input_spec().is_some() {
            match self.resampler.convert(None, &mut self.buffer) {
                Ok(c) => c.bytes,
                Err(e) => return self.fail(e),
            }
        } else {
            0
        };
        ChannelCounters::add(&self.ctx.counters.bytes_played, bytes as u64);
        self.ctx.counters.record_end(ChannelEndReason::Eof);
        tracing::info!(tail_bytes = bytes, "frame queue drained");
        let _ = self.ctx.events.send(ChannelEvent::Drained);
        bytes
    }

    fn fail(&mut self, e: Error) -> usize {
        tracing::error!("playback failed: {e}");
        self.ctx.counters.record_end(ChannelEndReason::PlaybackError);
        self.ctx.state.stop();
        self.ctx.packets.set_active(false);
        self.ctx.frames.set_active(false);
        let _ = self.ctx.events.send(ChannelEvent::PlaybackFailed(e.to_string()));
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;

    use crate::format::{AudioSpec, Channels, SampleFormat};

    fn stereo_f32(rate: u32, nb: usize, pts: i64) -> DecodedFrame {
        let spec = AudioSpec::new(
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
            SampleFormat::F32,
            rate,
        );
        let data = (0..nb * 2)
            .flat_map(|i| ((i % 64) as f32 / 128.0).to_le_bytes())
            .collect();
        DecodedFrame::new(spec, nb, pts, data).unwrap()
    }

    fn driver(rate: u32) -> (PlaybackDriver, DriverContext, Receiver<ChannelEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let ctx = DriverContext {
            packets: Arc::new(BlockingQueue::new(0)),
            frames: Arc::new(BlockingQueue::new(0)),
            state: Arc::new(RunStateCell::new()),
            clock: Arc::new(PlaybackClock::new()),
            counters: Arc::new(ChannelCounters::default()),
            events: tx,
        };
        ctx.packets.set_active(true);
        ctx.frames.set_active(true);
        let mut resampler = Resampler::new(1024);
        resampler
            .configure(AudioSpec::new(
                Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
                SampleFormat::F32,
                rate,
            ))
            .unwrap();
        let driver = PlaybackDriver::new(ctx.clone(), TimeBase::new(1, rate), resampler);
        (driver, ctx, rx)
    }

    #[test]
    fn pull_while_not_playing_drops_the_frame() {
        let (mut driver, ctx, _rx) = driver(44_100);
        ctx.frames.push(stereo_f32(44_100, 64, 0)).unwrap();
        assert_eq!(driver.pull(), 0);
        assert!(ctx.frames.is_empty());

        assert!(ctx.state.start());
        ctx.state.stop();
        ctx.frames.push(stereo_f32(44_100, 64, 64)).unwrap();
        assert_eq!(driver.pull(), 0);
        assert!(ctx.frames.is_empty());
        assert!(ctx.clock.relative_time().is_none());
    }

    #[test]
    fn pull_converts_and_advances_clock() {
        let (mut driver, ctx, _rx) = driver(44_100);
        assert!(ctx.state.start());

        let mut last = None;
        for n in 0..4 {
            ctx.frames.push(stereo_f32(44_100, 441, n * 441)).unwrap();
            assert_eq!(driver.pull(), 441 * 4);
            let now = ctx.clock.relative_time().unwrap();
            if let Some(prev) = last {
                assert!(now >= prev);
            }
            last = Some(now);
        }
        assert!((last.unwrap() - 0.03).abs() < 1e-9);
        assert_eq!(driver.output(8).len(), 8);
    }

    #[test]
    fn drained_queue_emits_tail_once() {
        let (mut driver, ctx, rx) = driver(48_000);
        assert!(ctx.state.start());
        for n in 0..10 {
            ctx.frames.push(stereo_f32(48_000, 1024, n * 1024)).unwrap();
        }
        ctx.frames.set_active(false);

        let mut total = 0;
        for _ in 0..10 {
            total += driver.pull();
        }
        total += driver.pull();
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Drained);

        assert_eq!(driver.pull(), 0);
        assert_eq!(driver.pull(), 0);
        assert!(rx.try_recv().is_err());

        let expected = 10 * 1024 * 44_100 / 48_000 * 4;
        assert!(total.abs_diff(expected) <= 4, "{total} vs {expected}");
        assert_eq!(ctx.counters.end_reason(), Some(ChannelEndReason::Eof));
    }

    #[test]
    fn format_change_reconfigures() {
        let (mut driver, ctx, _rx) = driver(44_100);
        assert!(ctx.state.start());
        ctx.frames.push(stereo_f32(44_100, 441, 0)).unwrap();
        ctx.frames.push(stereo_f32(22_050, 2048, 441)).unwrap();
        assert_eq!(driver.pull(), 441 * 4);
        driver.pull();
        assert_eq!(driver.resampler.input_spec().unwrap().rate, 22_050);
        assert!(ctx.state.is_playing());
    }

    #[test]
    fn unusable_frame_fails_playback() {
        let (mut driver, ctx, rx) = driver(44_100);
        assert!(ctx.state.start());
        let spec = AudioSpec::new(Channels::FRONT_LEFT, SampleFormat::S16, 0);
        ctx.frames
            .push(DecodedFrame::new(spec, 1, 0, vec![0, 0]).unwrap())
            .unwrap();

        assert_eq!(driver.pull(), 0);
        assert!(!ctx.state.is_playing());
        assert!(!ctx.packets.is_active());
        assert!(!ctx.frames.is_active());
        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::PlaybackFailed(_)));
        assert_eq!(ctx.counters.end_reason(), Some(ChannelEndReason::PlaybackError));
    }
}
