//! Codec boundary: packet in, frames out.
//!
//! The decoder loop only talks to [`Codec`]. Submission and retrieval are separate
//! calls because one packet can yield zero, one or several frames.

use std::collections::VecDeque;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use crate::error::{Error, Result};
use crate::format::{AudioSpec, SampleFormat};
use crate::frame::{DecodedFrame, EncodedPacket};

/// Non-success outcome of a codec call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The codec needs another packet before it can emit a frame. Not a failure.
    #[error("codec needs more input")]
    NeedMoreInput,
    /// Unrecoverable codec failure.
    #[error("codec failure: {0}")]
    Fatal(String),
}

/// An opaque decoder.
///
/// Implementations run on the decoder thread only.
pub trait Codec: Send {
    /// Hand one packet to the codec. The packet is consumed whatever the outcome.
    fn submit(&mut self, packet: EncodedPacket) -> std::result::Result<(), CodecError>;

    /// Retrieve the next decoded frame, or [`CodecError::NeedMoreInput`] when none is ready.
    fn receive_frame(&mut self) -> std::result::Result<DecodedFrame, CodecError>;

    /// Signal end of input so buffered frames become receivable.
    fn finish(&mut self) -> std::result::Result<(), CodecError> {
        Ok(())
    }
}

/// [`Codec`] backed by a Symphonia decoder.
///
/// Frames keep the codec's native sample width in planar layout; conversion to the
/// output format is left to the resampler.
pub struct SymphoniaCodec {
    decoder: Box<dyn Decoder>,
    ready: VecDeque<DecodedFrame>,
}

impl SymphoniaCodec {
    pub fn new(params: &CodecParameters) -> Result<Self> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("codec init: {e}")))?;
        Ok(Self::from_decoder(decoder))
    }

    pub fn from_decoder(decoder: Box<dyn Decoder>) -> Self {
        Self {
            decoder,
            ready: VecDeque::new(),
        }
    }
}

impl Codec for SymphoniaCodec {
    fn submit(&mut self, packet: EncodedPacket) -> std::result::Result<(), CodecError> {
        let pts = packet.pts;
        let ts = u64::try_from(packet.pts).unwrap_or(0);
        let packet = Packet::new_from_boxed_slice(packet.track_id, ts, packet.duration, packet.data);

        match self.decoder.decode(&packet) {
            Ok(buf) => {
                match frame_from_buffer(buf, pts) {
                    Some(frame) => self.ready.push_back(frame),
                    None => tracing::warn!(pts, "decoded buffer had inconsistent size; skipped"),
                }
                Ok(())
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                // Corrupt packet: skip it and keep decoding.
                tracing::warn!(pts, "decode error: {msg}");
                Ok(())
            }
            Err(SymphoniaError::ResetRequired) => {
                tracing::info!("decoder reset required");
                self.decoder.reset();
                Ok(())
            }
            Err(e) => Err(CodecError::Fatal(e.to_string())),
        }
    }

    fn receive_frame(&mut self) -> std::result::Result<DecodedFrame, CodecError> {
        self.ready.pop_front().ok_or(CodecError::NeedMoreInput)
    }
}

/// Copy a Symphonia buffer into an owned planar [`DecodedFrame`].
fn frame_from_buffer(buf: AudioBufferRef<'_>, pts: i64) -> Option<DecodedFrame> {
    let signal = *buf.spec();
    let nb_samples = buf.frames();
    let format = match &buf {
        AudioBufferRef::U8(_) => SampleFormat::U8Planar,
        AudioBufferRef::S16(_) => SampleFormat::S16Planar,
        AudioBufferRef::F32(_) => SampleFormat::F32Planar,
        AudioBufferRef::F64(_) => SampleFormat::F64Planar,
        _ => SampleFormat::S32Planar,
    };
    let data = match format {
        SampleFormat::U8Planar => planar_bytes::<u8, 1>(buf, u8::to_le_bytes),
        SampleFormat::S16Planar => planar_bytes::<i16, 2>(buf, i16::to_le_bytes),
        SampleFormat::F32Planar => planar_bytes::<f32, 4>(buf, f32::to_le_bytes),
        SampleFormat::F64Planar => planar_bytes::<f64, 8>(buf, f64::to_le_bytes),
        _ => planar_bytes::<i32, 4>(buf, i32::to_le_bytes),
    };
    let spec = AudioSpec::new(signal.channels, format, signal.rate);
    DecodedFrame::new(spec, nb_samples, pts, data)
}

fn planar_bytes<S: ConvertibleSample, const N: usize>(
    buf: AudioBufferRef<'_>,
    to_le: fn(S) -> [u8; N],
) -> Vec<u8> {
    let mut sample_buf = SampleBuffer::<S>::new(buf.frames() as u64, *buf.spec());
    sample_buf.copy_planar_ref(buf);
    sample_buf.samples().iter().flat_map(|&s| to_le(s)).collect()
}
