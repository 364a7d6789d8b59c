//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - checking a device can open the channel's output format

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{Error, Result};
use crate::format::OutputSpec;

/// Output device metadata for `--list-devices`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub max_channels: u16,
    pub is_default: bool,
}

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let devices = host
            .output_devices()
            .map_err(|e| Error::SinkInit(format!("enumerate output devices: {e}")))?;
        for d in devices {
            if matches_device_name(&device_name(&d), needle) {
                return Ok(d);
            }
        }
        return Err(Error::SinkInit(format!("no output device matched: {needle}")));
    }

    host.default_output_device()
        .ok_or_else(|| Error::SinkInit("no default output device".to_string()))
}

/// Best-effort human readable name.
pub fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}

/// Describe every output device of `host`.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host.default_output_device().map(|d| device_name(&d));
    let devices = host
        .output_devices()
        .map_err(|e| Error::SinkInit(format!("enumerate output devices: {e}")))?;

    let mut out = Vec::new();
    for d in devices {
        let name = device_name(&d);
        let (mut min_rate, mut max_rate, mut max_channels) = (u32::MAX, 0u32, 0u16);
        match d.supported_output_configs() {
            Ok(ranges) => {
                for r in ranges {
                    min_rate = min_rate.min(r.min_sample_rate());
                    max_rate = max_rate.max(r.max_sample_rate());
                    max_channels = max_channels.max(r.channels());
                }
            }
            Err(e) => tracing::warn!(device = %name, "supported configs unavailable: {e}"),
        }
        if min_rate > max_rate {
            min_rate = 0;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
            max_channels,
        });
    }
    Ok(out)
}

/// Sample format to open `spec` with on `device`, or `None` when no supported range
/// fits.
///
/// The channel produces S16; formats that need no conversion are preferred.
pub fn output_sample_format(
    device: &cpal::Device,
    spec: &OutputSpec,
) -> Result<Option<cpal::SampleFormat>> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| Error::SinkInit(format!("query supported configs: {e}")))?;
    Ok(ranges
        .into_iter()
        .filter(|r| range_supports(r.channels(), r.min_sample_rate(), r.max_sample_rate(), spec))
        .filter_map(|r| format_rank(r.sample_format()).map(|rank| (rank, r.sample_format())))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, format)| format))
}

fn range_supports(channels: u16, min_rate: u32, max_rate: u32, spec: &OutputSpec) -> bool {
    channels == spec.channels && (min_rate..=max_rate).contains(&spec.rate)
}

/// Preference among the formats the sink can write; `None` for the rest.
fn format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::I16 => Some(0),
        cpal::SampleFormat::F32 => Some(1),
        cpal::SampleFormat::I32 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        _ => None,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OUTPUT_SPEC;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", " USB "));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", ""));
    }

    #[test]
    fn range_supports_needs_channels_and_rate() {
        assert!(range_supports(2, 8_000, 192_000, &OUTPUT_SPEC));
        assert!(range_supports(2, 44_100, 44_100, &OUTPUT_SPEC));
        assert!(!range_supports(1, 8_000, 192_000, &OUTPUT_SPEC));
        assert!(!range_supports(2, 48_000, 96_000, &OUTPUT_SPEC));
    }

    #[test]
    fn float_only_devices_are_playable() {
        use cpal::SampleFormat;
        assert!(format_rank(SampleFormat::F32).is_some());
        assert!(format_rank(SampleFormat::I32).is_some());
        assert!(format_rank(SampleFormat::U16).is_some());
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::F32));
        assert!(format_rank(SampleFormat::U8).is_none());
        assert!(format_rank(SampleFormat::F64).is_none());
    }
}
