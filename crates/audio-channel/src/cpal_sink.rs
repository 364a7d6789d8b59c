//! CPAL-backed [`Sink`].
//!
//! The output stream's data callback drains a local `i16` queue and calls the pull
//! callback whenever that queue runs dry. Whatever the callback cannot supply is
//! written as silence. Devices without an `i16` format get the same samples converted
//! to the format they offer.

use std::collections::VecDeque;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::device::{device_name, output_sample_format};
use crate::error::{Error, Result};
use crate::format::OutputSpec;
use crate::sink::{BufferQueue, PullCallback, Sink, SinkFactory};

/// Creates [`Sink`]s on one CPAL output device.
pub struct CpalSinkFactory {
    device: cpal::Device,
}

impl CpalSinkFactory {
    pub fn new(device: cpal::Device) -> Self {
        Self { device }
    }
}

impl SinkFactory for CpalSinkFactory {
    fn create(&self, spec: &OutputSpec) -> Result<Box<dyn Sink>> {
        let name = device_name(&self.device);
        let Some(sample_format) = output_sample_format(&self.device, spec)? else {
            return Err(Error::SinkInit(format!(
                "device {name} cannot play {} Hz/{}ch",
                spec.rate, spec.channels
            )));
        };
        tracing::info!(
            device = %name,
            rate_hz = spec.rate,
            channels = spec.channels,
            sample_format = ?sample_format,
            "output sink created"
        );
        Ok(Box::new(CpalSink {
            device: self.device.clone(),
            sample_format,
            config: cpal::StreamConfig {
                channels: spec.channels,
                sample_rate: spec.rate,
                buffer_size: cpal::BufferSize::Default,
            },
            stream: None,
        }))
    }
}

struct CpalSink {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
}

impl Sink for CpalSink {
    fn register_pull_callback(&mut self, callback: PullCallback) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::InvalidState(
                "pull callback already registered".to_string(),
            ));
        }

        let stream = match self.sample_format {
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &self.config, callback),
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &self.config, callback),
            cpal::SampleFormat::I32 => build_stream::<i32>(&self.device, &self.config, callback),
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &self.config, callback),
            other => Err(Error::SinkInit(format!("unsupported sample format: {other:?}"))),
        }?;
        // Some hosts start streams on creation.
        stream
            .pause()
            .map_err(|e| Error::SinkInit(format!("pause new stream: {e}")))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no pull callback registered".to_string()))?;
        let res = if playing {
            stream.play().map_err(|e| e.to_string())
        } else {
            stream.pause().map_err(|e| e.to_string())
        };
        res.map_err(|e| Error::Sink(format!("set playing={playing}: {e}")))
    }
}

/// Output stream writing `T` samples converted from the pulled S16 PCM.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: PullCallback,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut pending = PcmQueue::default();
    let err_fn = |err| tracing::warn!("stream error: {err}");
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let silent = fill_from_pull(data, &mut pending, &mut callback);
                if silent > 0 {
                    tracing::trace!(samples = silent, "output underrun");
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::SinkInit(format!("build output stream: {e}")))
}

/// PCM handed over by the pull callback but not yet written to the device.
#[derive(Default)]
struct PcmQueue {
    samples: VecDeque<i16>,
}

impl BufferQueue for PcmQueue {
    fn enqueue(&mut self, pcm: &[u8]) {
        self.samples.extend(
            pcm.chunks_exact(OutputSpec::BYTES_PER_SAMPLE)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
    }
}

/// Fill `data` from `pending`, pulling more when it runs dry. Returns the number of
/// samples written as silence.
fn fill_from_pull<T>(data: &mut [T], pending: &mut PcmQueue, callback: &mut PullCallback) -> usize
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    let mut filled = 0;
    while filled < data.len() {
        if pending.samples.is_empty() {
            callback(pending);
            if pending.samples.is_empty() {
                data[filled..].fill(T::EQUILIBRIUM);
                return data.len() - filled;
            }
        }
        let n = (data.len() - filled).min(pending.samples.len());
        for (dst, src) in data[filled..filled + n]
            .iter_mut()
            .zip(pending.samples.drain(..n))
        {
            *dst = T::from_sample(src);
        }
        filled += n;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn pulls_until_the_device_buffer_is_full() {
        let mut blocks = vec![pcm(&[5, 6]), pcm(&[1, 2, 3, 4])];
        let mut callback: PullCallback = Box::new(move |queue| {
            if let Some(block) = blocks.pop() {
                queue.enqueue(&block);
            }
        });
        let mut pending = PcmQueue::default();

        let mut data = [0i16; 4];
        assert_eq!(fill_from_pull(&mut data, &mut pending, &mut callback), 0);
        assert_eq!(data, [1, 2, 3, 4]);

        let mut data = [9i16; 4];
        assert_eq!(fill_from_pull(&mut data, &mut pending, &mut callback), 2);
        assert_eq!(data, [5, 6, 0, 0]);
    }

    #[test]
    fn leftovers_carry_into_next_callback() {
        let mut callback: PullCallback = Box::new(|queue| queue.enqueue(&pcm(&[1, 2, 3])));
        let mut pending = PcmQueue::default();

        let mut data = [0i16; 2];
        fill_from_pull(&mut data, &mut pending, &mut callback);
        assert_eq!(data, [1, 2]);
        assert_eq!(pending.samples.len(), 1);

        fill_from_pull(&mut data, &mut pending, &mut callback);
        assert_eq!(data, [3, 1]);
    }

    #[test]
    fn empty_pull_is_silence() {
        let mut callback: PullCallback = Box::new(|_| {});
        let mut pending = PcmQueue::default();
        let mut data = [7i16; 6];
        assert_eq!(fill_from_pull(&mut data, &mut pending, &mut callback), 6);
        assert_eq!(data, [0; 6]);
    }

    #[test]
    fn float_and_unsigned_devices_get_converted_samples() {
        let mut callback: PullCallback =
            Box::new(|queue| queue.enqueue(&pcm(&[i16::MIN, 0, 16_384])));

        let mut pending = PcmQueue::default();
        let mut data = [1.0f32; 4];
        assert_eq!(fill_from_pull(&mut data, &mut pending, &mut callback), 0);
        assert_eq!(data, [-1.0, 0.0, 0.5, -1.0]);

        let mut callback: PullCallback = Box::new(|queue| queue.enqueue(&pcm(&[0, i16::MIN])));
        let mut pending = PcmQueue::default();
        let mut data = [0u16; 2];
        fill_from_pull(&mut data, &mut pending, &mut callback);
        assert_eq!(data, [32_768, 0]);

        let mut silent: PullCallback = Box::new(|_| {});
        let mut data = [7u16; 3];
        assert_eq!(fill_from_pull(&mut data, &mut PcmQueue::default(), &mut silent), 3);
        assert_eq!(data, [32_768; 3]);
    }
}
