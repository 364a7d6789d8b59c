//! Decoder loop: packet queue -> codec -> frame queue.
//!
//! Runs on its own thread. The loop blocks in `pop`/`push` only; stopping the
//! channel deactivates both queues, which wakes it without timeouts.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::codec::{Codec, CodecError};
use crate::frame::{DecodedFrame, EncodedPacket};
use crate::queue::BlockingQueue;
use crate::state::RunStateCell;
use crate::status::{ChannelCounters, ChannelEndReason, ChannelEvent};

/// Why the decoder loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderExit {
    /// The packet source finished and every decodable frame was queued.
    InputClosed,
    /// The channel was stopped.
    Stopped,
    /// The codec failed; the channel has been moved to `Stopped`.
    Failed(String),
}

/// Shared handles the decoder loop works on.
#[derive(Clone)]
pub struct DecoderContext {
    pub packets: Arc<BlockingQueue<EncodedPacket>>,
    pub frames: Arc<BlockingQueue<DecodedFrame>>,
    pub state: Arc<RunStateCell>,
    pub counters: Arc<ChannelCounters>,
}

/// Decode until the input closes, the channel stops, or the codec fails.
pub fn run_decoder_loop(codec: &mut dyn Codec, ctx: &DecoderContext) -> DecoderExit {
    tracing::info!("decoder loop started");

    let exit = loop {
        let Some(packet) = ctx.packets.pop() else {
            if !ctx.state.is_playing() {
                break DecoderExit::Stopped;
            }
            break finish_input(codec, ctx);
        };
        if !ctx.state.is_playing() {
            break DecoderExit::Stopped;
        }

        let pts = packet.pts;
        tracing::trace!(
            pts,
            pts_secs = packet.pts_seconds(),
            bytes = packet.data.len(),
            "submit packet"
        );
        if let Err(e) = codec.submit(packet) {
            break DecoderExit::Failed(format!("submit packet pts={pts}: {e}"));
        }
        ChannelCounters::add(&ctx.counters.packets_submitted, 1);

        if let Some(exit) = drain_codec(codec, ctx) {
            break exit;
        }
    };

    match &exit {
        DecoderExit::InputClosed => {
            ctx.frames.set_active(false);
            tracing::info!("decoder loop finished: input closed");
        }
        DecoderExit::Stopped => tracing::info!("decoder loop finished: stopped"),
        DecoderExit::Failed(msg) => {
            tracing::error!("decoder loop failed: {msg}");
            ctx.counters.record_end(ChannelEndReason::DecodeError);
            ctx.state.stop();
            ctx.packets.set_active(false);
            ctx.frames.set_active(false);
        }
    }
    exit
}

/// Start [`run_decoder_loop`] on a named thread that reports its exit on `events`.
pub fn spawn_decoder(
    mut codec: Box<dyn Codec>,
    ctx: DecoderContext,
    events: Sender<ChannelEvent>,
) -> io::Result<JoinHandle<DecoderExit>> {
    thread::Builder::new()
        .name("audio-decoder".to_string())
        .spawn(move || {
            let exit = run_decoder_loop(codec.as_mut(), &ctx);
            let _ = events.send(ChannelEvent::DecoderExited(exit.clone()));
            exit
        })
}

/// Flush the codec after the last packet and queue what it still holds.
fn finish_input(codec: &mut dyn Codec, ctx: &DecoderContext) -> DecoderExit {
    if let Err(e) = codec.finish() {
        return DecoderExit::Failed(format!("finish: {e}"));
    }
    drain_codec(codec, ctx).unwrap_or(DecoderExit::InputClosed)
}

/// Move every ready frame into the frame queue. `None` means "feed the next packet".
fn drain_codec(codec: &mut dyn Codec, ctx: &DecoderContext) -> Option<DecoderExit> {
    loop {
        match codec.receive_frame() {
            Ok(frame) => {
                ChannelCounters::add(&ctx.counters.frames_decoded, 1);
                tracing::trace!(pts = frame.pts, samples = frame.nb_samples(), "frame decoded");
                if ctx.frames.push(frame).is_err() {
                    return Some(DecoderExit::Stopped);
                }
            }
            Err(CodecError::NeedMoreInput) => return None,
            Err(CodecError::Fatal(msg)) => return Some(DecoderExit::Failed(msg)),
        }
    }
}
