//! Packet source: demux a container with Symphonia into the packet queue.
//!
//! Uses Symphonia to:
//! - probe the input container and pick its default audio track
//! - describe the stream (layout, rate, time base) for the channel
//! - push encoded packets into the queue from a background thread
//!
//! End of stream is signalled by deactivating the packet queue.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::codec::SymphoniaCodec;
use crate::error::{Error, Result};
use crate::format::{AudioSpec, SampleFormat, TimeBase};
use crate::frame::EncodedPacket;
use crate::queue::BlockingQueue;

/// Descriptive metadata captured while probing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    pub bit_depth: Option<u16>,
    pub duration_ms: Option<u64>,
}

/// How the demux thread ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceExit {
    EndOfStream,
    /// The packet queue rejected a packet.
    Stopped,
    Failed(String),
}

/// A probed container, ready to stream one audio track.
pub struct FileSource {
    format: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
    spec: AudioSpec,
    time_base: TimeBase,
    info: SourceInfo,
}

impl FileSource {
    /// Open and probe `path`, using its extension as a format hint.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        Self::from_media_source(Box::new(file), hint)
    }

    /// Probe an arbitrary Symphonia [`MediaSource`].
    pub fn from_media_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| Error::UnsupportedFormat("no default audio track".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let channels = params
            .channels
            .ok_or_else(|| Error::UnsupportedFormat("unknown channel layout".to_string()))?;
        let rate = params
            .sample_rate
            .ok_or_else(|| Error::UnsupportedFormat("unknown sample rate".to_string()))?;
        let sample_format = params
            .sample_format
            .map(SampleFormat::from_symphonia)
            .unwrap_or(SampleFormat::F32)
            .planar();

        let spec = AudioSpec::new(channels, sample_format, rate);
        let time_base = params.time_base.unwrap_or_else(|| TimeBase::new(1, rate));
        let info = SourceInfo {
            codec: codec_name_from_params(&params),
            bit_depth: params
                .bits_per_sample
                .or(params.bits_per_coded_sample)
                .and_then(|v| u16::try_from(v).ok()),
            duration_ms: duration_ms_from_codec_params(&params),
        };

        tracing::info!(
            track_id,
            rate_hz = rate,
            channels = spec.channel_count(),
            codec = info.codec.as_deref().unwrap_or("unknown"),
            "source probed"
        );

        Ok(Self {
            format,
            track_id,
            params,
            spec,
            time_base,
            info,
        })
    }

    /// Expected spec of decoded frames.
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Build a codec for this track.
    pub fn make_codec(&self) -> Result<SymphoniaCodec> {
        SymphoniaCodec::new(&self.params)
    }

    /// Push every packet of the track into `packets` on a background thread, then
    /// deactivate the queue.
    pub fn spawn(
        mut self,
        packets: Arc<BlockingQueue<EncodedPacket>>,
    ) -> io::Result<JoinHandle<SourceExit>> {
        thread::Builder::new()
            .name("audio-source".to_string())
            .spawn(move || {
                let exit = self.pump(&packets);
                packets.set_active(false);
                match &exit {
                    SourceExit::Failed(msg) => tracing::warn!("demux stopped: {msg}"),
                    other => tracing::info!(exit = ?other, "source finished"),
                }
                exit
            })
    }

    fn pump(&mut self, packets: &BlockingQueue<EncodedPacket>) -> SourceExit {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return SourceExit::EndOfStream;
                }
                Err(e) => return SourceExit::Failed(e.to_string()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let encoded = EncodedPacket::new(
                packet.track_id(),
                i64::try_from(packet.ts()).unwrap_or(i64::MAX),
                packet.dur(),
                self.time_base,
                Box::from(packet.buf()),
            );
            if packets.push(encoded).is_err() {
                return SourceExit::Stopped;
            }
        }
    }
}

/// Best-effort duration in milliseconds from codec metadata.
fn duration_ms_from_codec_params(params: &CodecParameters) -> Option<u64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// 16-bit PCM WAV with `frames` frames of a ramp.
    pub(crate) fn wav_bytes(rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let data_len = (frames * channels as usize * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * u32::from(channels) * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames * channels as usize {
            out.extend_from_slice(&((i % 1000) as i16 * 16).to_le_bytes());
        }
        out
    }

    pub(crate) fn wav_source(rate: u32, channels: u16, frames: usize) -> FileSource {
        let mut hint = Hint::new();
        hint.with_extension("wav");
        FileSource::from_media_source(Box::new(Cursor::new(wav_bytes(rate, channels, frames))), hint)
            .unwrap()
    }

    #[test]
    fn probe_describes_the_track() {
        let source = wav_source(48_000, 2, 4800);
        assert_eq!(source.spec().rate, 48_000);
        assert_eq!(source.spec().channel_count(), 2);
        assert_eq!(source.info().codec.as_deref(), Some("PCM_S16"));
        assert_eq!(source.info().duration_ms, Some(100));
        assert_eq!(source.time_base().denom, 48_000);
    }

    #[test]
    fn pump_fills_queue_then_deactivates() {
        let source = wav_source(44_100, 1, 44_100);
        let packets = Arc::new(BlockingQueue::new(0));
        packets.set_active(true);

        let exit = source.spawn(packets.clone()).unwrap().join().unwrap();
        assert_eq!(exit, SourceExit::EndOfStream);
        assert!(!packets.is_active());

        let drained: Vec<EncodedPacket> = std::iter::from_fn(|| packets.pop()).collect();
        assert!(!drained.is_empty());
        assert!(drained.windows(2).all(|w| w[0].pts < w[1].pts));
    }

    #[test]
    fn inactive_queue_stops_the_pump() {
        let source = wav_source(44_100, 1, 44_100);
        let packets = Arc::new(BlockingQueue::new(0));
        let exit = source.spawn(packets).unwrap().join().unwrap();
        assert_eq!(exit, SourceExit::Stopped);
    }

    #[test]
    fn garbage_input_fails_to_probe() {
        let res = FileSource::from_media_source(
            Box::new(Cursor::new(vec![0u8; 64])),
            Hint::new(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn duration_ms_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_ms_from_codec_params(&params).is_none());
    }
}
