//! `AudioChannel`: owns one decode -> resample -> sink pipeline.
//!
//! Thread layout once playing:
//! - decoder thread: packet queue -> codec -> frame queue
//! - sink callback thread: frame queue -> resampler -> sink
//! - controller (the owner of this struct): `play`, `stop`, status reads
//!
//! The two queues are the only data path between threads. Stopping sets the run
//! state, deactivates both queues (waking any blocked thread) and drains them.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::clock::PlaybackClock;
use crate::codec::Codec;
use crate::config::ChannelConfig;
use crate::decode::{DecoderContext, DecoderExit, spawn_decoder};
use crate::error::{Error, Result};
use crate::format::{AudioSpec, OUTPUT_SPEC, TimeBase};
use crate::frame::{DecodedFrame, EncodedPacket};
use crate::playback::{DriverContext, PlaybackDriver};
use crate::queue::BlockingQueue;
use crate::resample::Resampler;
use crate::sink::{Sink, SinkFactory};
use crate::state::{RunState, RunStateCell};
use crate::status::{ChannelCounters, ChannelEndReason, ChannelEvent, ChannelStatus};

pub struct AudioChannel {
    spec: AudioSpec,
    time_base: TimeBase,
    config: ChannelConfig,
    packets: Arc<BlockingQueue<EncodedPacket>>,
    frames: Arc<BlockingQueue<DecodedFrame>>,
    state: Arc<RunStateCell>,
    clock: Arc<PlaybackClock>,
    counters: Arc<ChannelCounters>,
    events_tx: Sender<ChannelEvent>,
    events_rx: Receiver<ChannelEvent>,
    codec: Option<Box<dyn Codec>>,
    sink: Option<Box<dyn Sink>>,
    decoder: Option<JoinHandle<DecoderExit>>,
}

impl AudioChannel {
    /// Create an idle channel for a stream described by `spec` and `time_base`.
    pub fn new(
        spec: AudioSpec,
        time_base: TimeBase,
        config: ChannelConfig,
        codec: Box<dyn Codec>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            spec,
            time_base,
            packets: Arc::new(BlockingQueue::new(config.packet_queue_depth)),
            frames: Arc::new(BlockingQueue::new(config.frame_queue_depth)),
            config,
            state: Arc::new(RunStateCell::new()),
            clock: Arc::new(PlaybackClock::new()),
            counters: Arc::new(ChannelCounters::default()),
            events_tx,
            events_rx,
            codec: Some(codec),
            sink: None,
            decoder: None,
        }
    }

    /// Queue the packet source pushes into. Deactivate it to signal end of stream.
    ///
    /// Inactive until [`Self::play`] succeeds.
    pub fn packet_queue(&self) -> Arc<BlockingQueue<EncodedPacket>> {
        self.packets.clone()
    }

    /// Open a sink from `factory` and start decoding.
    ///
    /// If the sink cannot be created or the callback cannot be registered, no thread is
    /// started and the channel stays idle.
    pub fn play(&mut self, factory: &dyn SinkFactory) -> Result<()> {
        if self.state.get() != RunState::Idle {
            return Err(Error::InvalidState(format!(
                "play requires an idle channel, state is {:?}",
                self.state.get()
            )));
        }
        let Some(codec) = self.codec.take() else {
            return Err(Error::InvalidState("codec already consumed".to_string()));
        };

        let mut sink = match self.open_sink(factory) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!("sink setup failed: {e}");
                self.codec = Some(codec);
                return Err(e);
            }
        };

        self.packets.set_active(true);
        self.frames.set_active(true);
        self.state.start();
        let ctx = DecoderContext {
            packets: self.packets.clone(),
            frames: self.frames.clone(),
            state: self.state.clone(),
            counters: self.counters.clone(),
        };
        match spawn_decoder(codec, ctx, self.events_tx.clone()) {
            Ok(handle) => self.decoder = Some(handle),
            Err(e) => {
                self.sink = Some(sink);
                self.stop();
                return Err(e.into());
            }
        }

        let started = sink.set_playing(true);
        self.sink = Some(sink);
        if let Err(e) = started {
            self.stop();
            return Err(e);
        }

        tracing::info!(
            source_rate_hz = self.spec.rate,
            source_channels = self.spec.channel_count(),
            output_rate_hz = OUTPUT_SPEC.rate,
            "channel playing"
        );
        Ok(())
    }

    /// Stop playback, release queued packets and frames, and join the decoder.
    ///
    /// Idempotent. Also runs on drop.
    pub fn stop(&mut self) {
        let previous = self.state.stop();
        if previous == RunState::Playing {
            self.counters.record_end(ChannelEndReason::Stopped);
        }

        self.packets.set_active(false);
        self.frames.set_active(false);
        let dropped = self.packets.drain().len() + self.frames.drain().len();

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.set_playing(false) {
                tracing::warn!("sink pause failed: {e}");
            }
        }
        if let Some(handle) = self.decoder.take() {
            match handle.join() {
                Ok(exit) => tracing::debug!(exit = ?exit, "decoder joined"),
                Err(_) => tracing::error!("decoder thread panicked"),
            }
        }
        self.sink = None;
        if previous != RunState::Stopped {
            tracing::info!(dropped, "channel stopped");
        }
    }

    /// Seconds of the last played frame; `None` before anything was played.
    pub fn relative_time(&self) -> Option<f64> {
        self.clock.relative_time()
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn status(&self) -> ChannelStatus {
        let mut status = ChannelStatus {
            state: self.state.get(),
            relative_time_secs: self.clock.relative_time(),
            source_rate_hz: Some(self.spec.rate),
            source_channels: u16::try_from(self.spec.channel_count()).ok(),
            source_format: Some(self.spec.format.to_string()),
            output_rate_hz: OUTPUT_SPEC.rate,
            output_channels: OUTPUT_SPEC.channels,
            queued_packets: self.packets.len(),
            queued_frames: self.frames.len(),
            ..ChannelStatus::default()
        };
        self.counters.fill(&mut status);
        status
    }

    /// Receiver of [`ChannelEvent`]s. Clones share one stream; each event is delivered once.
    pub fn events(&self) -> Receiver<ChannelEvent> {
        self.events_rx.clone()
    }

    /// Block until every decoded frame has been consumed after end of input, or the
    /// channel stopped.
    pub fn wait_until_drained(&self) {
        self.frames.wait_until_drained();
    }

    fn open_sink(&self, factory: &dyn SinkFactory) -> Result<Box<dyn Sink>> {
        let mut resampler = Resampler::new(self.config.resample_chunk_frames);
        resampler.configure(self.spec)?;

        let mut sink = factory.create(&OUTPUT_SPEC)?;
        let driver = PlaybackDriver::new(
            DriverContext {
                packets: self.packets.clone(),
                frames: self.frames.clone(),
                state: self.state.clone(),
                clock: self.clock.clone(),
                counters: self.counters.clone(),
                events: self.events_tx.clone(),
            },
            self.time_base,
            resampler,
        );
        sink.register_pull_callback(driver.into_pull_callback())?;
        Ok(sink)
    }
}

impl Drop for AudioChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
