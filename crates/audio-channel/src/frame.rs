//! Owned units that travel through the channel queues.

use symphonia::core::conv::FromSample;

use crate::format::{AudioSpec, SampleFormat, TimeBase, ticks_to_seconds};

/// One compressed packet as produced by the demuxer.
#[derive(Debug)]
pub struct EncodedPacket {
    /// Track the packet belongs to.
    pub track_id: u32,
    /// Presentation timestamp in `time_base` ticks.
    pub pts: i64,
    /// Duration in `time_base` ticks (0 when unknown).
    pub duration: u64,
    pub time_base: TimeBase,
    pub data: Box<[u8]>,
}

impl EncodedPacket {
    pub fn new(track_id: u32, pts: i64, duration: u64, time_base: TimeBase, data: Box<[u8]>) -> Self {
        Self {
            track_id,
            pts,
            duration,
            time_base,
            data,
        }
    }

    pub fn pts_seconds(&self) -> f64 {
        ticks_to_seconds(self.pts, self.time_base)
    }
}

/// Raw decoded samples in the codec's native layout.
///
/// `data` holds `nb_samples` samples per channel, interleaved or planar according to
/// `spec.format`. The frame is dropped by whichever stage consumes it.
#[derive(Debug)]
pub struct DecodedFrame {
    spec: AudioSpec,
    nb_samples: usize,
    /// Presentation timestamp in stream time-base ticks.
    pub pts: i64,
    data: Vec<u8>,
}

impl DecodedFrame {
    /// Wrap raw sample bytes.
    ///
    /// Returns `None` when `data` is not exactly `nb_samples` frames of `spec`.
    pub fn new(spec: AudioSpec, nb_samples: usize, pts: i64, data: Vec<u8>) -> Option<Self> {
        if data.len() != nb_samples * spec.bytes_per_frame() {
            return None;
        }
        Some(Self {
            spec,
            nb_samples,
            pts,
            data,
        })
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Samples per channel.
    pub fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Read sample `index` of channel `channel` as `f32` in `[-1.0, 1.0]`.
    ///
    /// Callers stay within `nb_samples` and `spec`'s channel count.
    pub fn sample_f32(&self, channel: usize, index: usize) -> f32 {
        let format = self.spec.format;
        let bps = format.bytes_per_sample();
        let channels = self.spec.channel_count();
        let slot = if format.is_planar() {
            channel * self.nb_samples + index
        } else {
            index * channels + channel
        };
        let at = slot * bps;
        decode_sample(format, &self.data[at..at + bps])
    }
}

fn decode_sample(format: SampleFormat, b: &[u8]) -> f32 {
    match format {
        SampleFormat::U8 | SampleFormat::U8Planar => f32::from_sample(b[0]),
        SampleFormat::S16 | SampleFormat::S16Planar => {
            f32::from_sample(i16::from_le_bytes([b[0], b[1]]))
        }
        SampleFormat::S32 | SampleFormat::S32Planar => {
            f32::from_sample(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        SampleFormat::F32 | SampleFormat::F32Planar => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        SampleFormat::F64 | SampleFormat::F64Planar => {
            f32::from_sample(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        }
    }
}
