//! Sample formats, stream specs and the fixed output contract.

use std::fmt;

pub use symphonia::core::audio::Channels;
pub use symphonia::core::units::TimeBase;

/// Sample storage of a decoded frame.
///
/// Multi-byte samples are little-endian. Planar formats store one contiguous plane
/// per channel, in the channel-mask bit order; interleaved formats store
/// `frame0[ch0], frame0[ch1], ..., frame1[ch0], ...`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
    U8Planar,
    S16Planar,
    S32Planar,
    F32Planar,
    F64Planar,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::U8Planar => 1,
            Self::S16 | Self::S16Planar => 2,
            Self::S32 | Self::S32Planar | Self::F32 | Self::F32Planar => 4,
            Self::F64 | Self::F64Planar => 8,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(
            self,
            Self::U8Planar | Self::S16Planar | Self::S32Planar | Self::F32Planar | Self::F64Planar
        )
    }

    /// The planar counterpart of this format (identity for planar formats).
    pub fn planar(self) -> Self {
        match self {
            Self::U8 => Self::U8Planar,
            Self::S16 => Self::S16Planar,
            Self::S32 => Self::S32Planar,
            Self::F32 => Self::F32Planar,
            Self::F64 => Self::F64Planar,
            other => other,
        }
    }

    /// Short label used in logs and status payloads.
    pub fn label(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::U8Planar => "u8p",
            Self::S16Planar => "s16p",
            Self::S32Planar => "s32p",
            Self::F32Planar => "f32p",
            Self::F64Planar => "f64p",
        }
    }

    /// Map a Symphonia sample format onto the closest storage format we carry.
    ///
    /// Odd widths (8/24-bit signed, unsigned 16/24/32-bit) widen to `S32`.
    pub fn from_symphonia(fmt: symphonia::core::sample::SampleFormat) -> Self {
        use symphonia::core::sample::SampleFormat as Sf;
        match fmt {
            Sf::U8 => Self::U8,
            Sf::S16 => Self::S16,
            Sf::F32 => Self::F32,
            Sf::F64 => Self::F64,
            Sf::S8 | Sf::S24 | Sf::S32 | Sf::U16 | Sf::U24 | Sf::U32 => Self::S32,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Layout, sample format and rate of a PCM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioSpec {
    pub channels: Channels,
    pub format: SampleFormat,
    pub rate: u32,
}

impl AudioSpec {
    pub fn new(channels: Channels, format: SampleFormat, rate: u32) -> Self {
        Self {
            channels,
            format,
            rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.count()
    }

    /// Bytes occupied by one sample of every channel.
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channel_count()
    }
}

/// The only PCM layout the hardware sink is asked to play.
///
/// Stereo, signed 16-bit little-endian, 44.1 kHz, interleaved L/R.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    pub channels: u16,
    pub rate: u32,
}

impl OutputSpec {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub const fn bytes_per_frame(&self) -> usize {
        Self::BYTES_PER_SAMPLE * self.channels as usize
    }

    /// Size of one second of output audio.
    pub const fn bytes_per_second(&self) -> usize {
        self.bytes_per_frame() * self.rate as usize
    }
}

pub const OUTPUT_SPEC: OutputSpec = OutputSpec {
    channels: 2,
    rate: 44_100,
};

/// Convert a timestamp in `time_base` ticks to seconds.
pub fn ticks_to_seconds(ticks: i64, time_base: TimeBase) -> f64 {
    if time_base.denom == 0 {
        return 0.0;
    }
    ticks as f64 * f64::from(time_base.numer) / f64::from(time_base.denom)
}

/// `ceil(value * num / den)` without intermediate overflow.
pub(crate) fn rescale_round_up(value: u64, num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    let product = u128::from(value) * u128::from(num);
    product.div_ceil(u128::from(den)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_spec_sizes_one_second_buffer() {
        assert_eq!(OUTPUT_SPEC.bytes_per_frame(), 4);
        assert_eq!(OUTPUT_SPEC.bytes_per_second(), 176_400);
    }

    #[test]
    fn planar_maps_interleaved_formats() {
        assert_eq!(SampleFormat::S16.planar(), SampleFormat::S16Planar);
        assert_eq!(SampleFormat::F32Planar.planar(), SampleFormat::F32Planar);
        assert!(SampleFormat::F64Planar.is_planar());
        assert!(!SampleFormat::U8.is_planar());
    }

    #[test]
    fn from_symphonia_widens_odd_widths() {
        use symphonia::core::sample::SampleFormat as Sf;
        assert_eq!(SampleFormat::from_symphonia(Sf::S24), SampleFormat::S32);
        assert_eq!(SampleFormat::from_symphonia(Sf::U16), SampleFormat::S32);
        assert_eq!(SampleFormat::from_symphonia(Sf::S16), SampleFormat::S16);
    }

    #[test]
    fn ticks_to_seconds_uses_time_base() {
        let tb = TimeBase::new(1, 48_000);
        assert_eq!(ticks_to_seconds(96_000, tb), 2.0);
        assert_eq!(ticks_to_seconds(-48_000, tb), -1.0);
    }

    #[test]
    fn rescale_round_up_rounds_toward_infinity() {
        assert_eq!(rescale_round_up(1024, 44_100, 48_000), 941);
        assert_eq!(rescale_round_up(48_000, 44_100, 48_000), 44_100);
        assert_eq!(rescale_round_up(5, 1, 0), 0);
    }
}
