//! Conversion from any decoded layout to the fixed output format.
//!
//! Every frame goes through three steps:
//! 1. channel mix to stereo `f32` (mono is duplicated, surround is folded down)
//! 2. rate conversion with Rubato's sinc resampler (skipped when the rate already matches)
//! 3. packing to interleaved signed 16-bit little-endian
//!
//! Rubato consumes fixed-size chunks, so input that does not fill a chunk waits in
//! `pending`, and output that does not fit the caller's buffer waits in `carry`. Both
//! count towards [`Resampler::delay_samples`] and come out on later calls.

use std::f32::consts::FRAC_1_SQRT_2;

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};
use symphonia::core::conv::FromSample;

use crate::error::{Error, Result};
use crate::format::{AudioSpec, Channels, OUTPUT_SPEC, OutputSpec, rescale_round_up};
use crate::frame::DecodedFrame;

const OUT_CHANNELS: usize = OUTPUT_SPEC.channels as usize;

/// Result of one [`Resampler::convert`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Converted {
    /// Output samples per channel written to the buffer.
    pub samples: usize,
    /// `samples * bytes_per_sample * channels`.
    pub bytes: usize,
}

/// Stateful converter into [`OUTPUT_SPEC`].
pub struct Resampler {
    chunk_frames: usize,
    input: Option<AudioSpec>,
    /// Per input channel `(left, right)` gains.
    mix: Vec<(f32, f32)>,
    engine: Option<Box<dyn rubato::Resampler<f32> + Send>>,
    /// Mixed stereo input not yet handed to the engine.
    pending: Vec<f32>,
    /// Engine output scratch, sized for the engine's largest chunk.
    scratch: Vec<f32>,
    /// Converted stereo output not yet emitted.
    carry: Vec<f32>,
    /// Leading engine output frames still to discard (filter latency).
    skip_frames: usize,
    frames_in: u64,
    frames_out: u64,
}

impl Resampler {
    /// Create an unconfigured resampler feeding Rubato `chunk_frames` at a time.
    pub fn new(chunk_frames: usize) -> Self {
        Self {
            chunk_frames: chunk_frames.max(1),
            input: None,
            mix: Vec::new(),
            engine: None,
            pending: Vec::new(),
            scratch: Vec::new(),
            carry: Vec::new(),
            skip_frames: 0,
            frames_in: 0,
            frames_out: 0,
        }
    }

    pub fn output_spec(&self) -> OutputSpec {
        OUTPUT_SPEC
    }

    /// Input spec currently configured.
    pub fn input_spec(&self) -> Option<AudioSpec> {
        self.input
    }

    /// (Re)initialize for `spec`. Any carried samples of the previous input are discarded.
    pub fn configure(&mut self, spec: AudioSpec) -> Result<()> {
        if spec.rate == 0 {
            return Err(Error::UnsupportedFormat("input sample rate is 0".to_string()));
        }
        if spec.channel_count() == 0 {
            return Err(Error::UnsupportedFormat("input has no channels".to_string()));
        }

        let engine = if spec.rate == OUTPUT_SPEC.rate {
            None
        } else {
            Some(build_engine(spec.rate, self.chunk_frames)?)
        };

        self.mix = stereo_mix(spec.channels);
        self.scratch = match &engine {
            Some(e) => vec![0.0; e.output_frames_max() * OUT_CHANNELS],
            None => Vec::new(),
        };
        self.skip_frames = engine.as_ref().map_or(0, |e| e.output_delay());
        self.engine = engine;
        self.pending.clear();
        self.carry.clear();
        self.frames_in = 0;
        self.frames_out = 0;
        self.input = Some(spec);

        tracing::info!(
            from_hz = spec.rate,
            to_hz = OUTPUT_SPEC.rate,
            channels = spec.channel_count(),
            format = %spec.format,
            resampling = self.engine.is_some(),
            "resampler configured"
        );
        Ok(())
    }

    /// Input-rate samples accepted but not yet emitted (pending input, filter latency, carry).
    pub fn delay_samples(&self) -> u64 {
        let Some(spec) = self.input else {
            return 0;
        };
        let in_rate = u128::from(spec.rate);
        let out_rate = u128::from(OUTPUT_SPEC.rate);
        let owed = (u128::from(self.frames_in) * out_rate)
            .saturating_sub(u128::from(self.frames_out) * in_rate);
        owed.div_ceil(out_rate) as u64
    }

    /// Upper bound of output samples a call with `nb_samples` new input samples can emit:
    /// `ceil((delay + nb_samples) * out_rate / in_rate)`.
    pub fn max_output_samples(&self, nb_samples: usize) -> usize {
        let Some(spec) = self.input else {
            return 0;
        };
        rescale_round_up(
            self.delay_samples() + nb_samples as u64,
            u64::from(OUTPUT_SPEC.rate),
            u64::from(spec.rate),
        ) as usize
    }

    /// Convert `frame` into `out`, or flush the remaining tail when `frame` is `None`.
    ///
    /// `out` should hold [`Self::max_output_samples`] samples; anything that does not fit
    /// is kept and emitted by the next call.
    pub fn convert(&mut self, frame: Option<&DecodedFrame>, out: &mut [u8]) -> Result<Converted> {
        let spec = self
            .input
            .ok_or_else(|| Error::Resample("resampler used before configure".to_string()))?;
        let capacity = out.len() / OUTPUT_SPEC.bytes_per_frame();

        let Some(frame) = frame else {
            self.flush()?;
            let converted = self.emit(out, capacity);
            self.restart();
            return Ok(converted);
        };

        if frame.spec() != spec {
            return Err(Error::Resample(format!(
                "frame is {} Hz/{}ch/{}, resampler configured for {} Hz/{}ch/{}",
                frame.spec().rate,
                frame.spec().channel_count(),
                frame.spec().format,
                spec.rate,
                spec.channel_count(),
                spec.format
            )));
        }

        let max_samples = self.max_output_samples(frame.nb_samples()).min(capacity);
        mix_to_stereo(frame, &self.mix, &mut self.pending);
        self.frames_in += frame.nb_samples() as u64;
        self.process_ready_chunks()?;
        Ok(self.emit(out, max_samples))
    }

    /// Feed every complete chunk of pending input through the engine.
    fn process_ready_chunks(&mut self) -> Result<()> {
        let Some(engine) = self.engine.as_deref_mut() else {
            self.carry.append(&mut self.pending);
            return Ok(());
        };
        loop {
            let need = engine.input_frames_next();
            if self.pending.len() < need * OUT_CHANNELS {
                return Ok(());
            }
            let produced = process_chunk(
                engine,
                &self.pending[..need * OUT_CHANNELS],
                need,
                &mut self.scratch,
            )?;
            self.pending.drain(..need * OUT_CHANNELS);
            append_output(
                &mut self.carry,
                &mut self.skip_frames,
                &self.scratch[..produced * OUT_CHANNELS],
            );
        }
    }

    /// Push zero-padded chunks until everything owed is in `carry`, then trim the excess
    /// so the total output is `round(frames_in * out_rate / in_rate)`.
    fn flush(&mut self) -> Result<()> {
        let Some(spec) = self.input else {
            return Ok(());
        };
        let owed_total = owed_output_frames(self.frames_in, spec.rate);
        let keep = owed_total.saturating_sub(self.frames_out) as usize;

        if let Some(engine) = self.engine.as_deref_mut() {
            let need = engine.input_frames_next().max(1);
            let per_round = (need as u64 * u64::from(OUTPUT_SPEC.rate) / u64::from(spec.rate)).max(1);
            let max_rounds = (keep as u64 + self.skip_frames as u64).div_ceil(per_round) + 2;

            let mut rounds = 0;
            while self.carry.len() < keep * OUT_CHANNELS && rounds < max_rounds {
                let mut block = vec![0.0f32; need * OUT_CHANNELS];
                let take = self.pending.len().min(block.len());
                block[..take].copy_from_slice(&self.pending[..take]);
                self.pending.drain(..take);

                let produced = process_chunk(engine, &block, need, &mut self.scratch)?;
                append_output(
                    &mut self.carry,
                    &mut self.skip_frames,
                    &self.scratch[..produced * OUT_CHANNELS],
                );
                rounds += 1;
            }
        } else {
            self.carry.append(&mut self.pending);
        }

        self.pending.clear();
        self.carry.truncate(keep * OUT_CHANNELS);
        Ok(())
    }

    /// Start a fresh stream with the same input spec after a flush.
    fn restart(&mut self) {
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.reset();
            self.skip_frames = engine.output_delay();
        }
        self.frames_in = 0;
        self.frames_out = 0;
    }

    /// Pack up to `max_samples` carried frames into `out` as S16LE.
    fn emit(&mut self, out: &mut [u8], max_samples: usize) -> Converted {
        let samples = (self.carry.len() / OUT_CHANNELS).min(max_samples);
        let values = samples * OUT_CHANNELS;
        for (dst, &s) in out
            .chunks_exact_mut(OutputSpec::BYTES_PER_SAMPLE)
            .zip(&self.carry[..values])
        {
            dst.copy_from_slice(&i16::from_sample(s.clamp(-1.0, 1.0)).to_le_bytes());
        }
        self.carry.drain(..values);
        self.frames_out += samples as u64;
        Converted {
            samples,
            bytes: samples * OUTPUT_SPEC.bytes_per_frame(),
        }
    }
}

fn build_engine(in_rate: u32, chunk_frames: usize) -> Result<Box<dyn rubato::Resampler<f32> + Send>> {
    let f_ratio = f64::from(OUTPUT_SPEC.rate) / f64::from(in_rate);

    let sinc_len = 128;
    let oversampling_factor = 256;
    let interpolation = SincInterpolationType::Cubic;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);

    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation,
        oversampling_factor,
        window,
    };

    let engine = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_frames,
        OUT_CHANNELS,
        FixedAsync::Input,
    )
    .map_err(|e| Error::Resample(format!("resampler init: {e}")))?;
    Ok(Box::new(engine))
}

/// Run one full chunk through the engine, returning output frames written to `scratch`.
fn process_chunk(
    engine: &mut dyn rubato::Resampler<f32>,
    input: &[f32],
    frames: usize,
    scratch: &mut [f32],
) -> Result<usize> {
    let input_adapter = InterleavedSlice::new(input, OUT_CHANNELS, frames)
        .map_err(|e| Error::Resample(format!("interleaved slice (input): {e}")))?;
    let out_capacity_frames = scratch.len() / OUT_CHANNELS;
    let mut output_adapter = InterleavedSlice::new_mut(scratch, OUT_CHANNELS, out_capacity_frames)
        .map_err(|e| Error::Resample(format!("interleaved slice (output): {e}")))?;

    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let (_nbr_in, nbr_out) = engine
        .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
        .map_err(|e| Error::Resample(format!("resampler process: {e}")))?;
    Ok(nbr_out)
}

fn append_output(carry: &mut Vec<f32>, skip_frames: &mut usize, produced: &[f32]) {
    let frames = produced.len() / OUT_CHANNELS;
    let skipped = (*skip_frames).min(frames);
    *skip_frames -= skipped;
    carry.extend_from_slice(&produced[skipped * OUT_CHANNELS..]);
}

/// `round(frames_in * out_rate / in_rate)`.
fn owed_output_frames(frames_in: u64, in_rate: u32) -> u64 {
    let num = u128::from(frames_in) * u128::from(OUTPUT_SPEC.rate);
    let den = u128::from(in_rate);
    ((2 * num + den) / (2 * den)) as u64
}

fn mix_to_stereo(frame: &DecodedFrame, mix: &[(f32, f32)], pending: &mut Vec<f32>) {
    pending.reserve(frame.nb_samples() * OUT_CHANNELS);
    for i in 0..frame.nb_samples() {
        let (mut l, mut r) = (0.0f32, 0.0f32);
        for (ch, &(gl, gr)) in mix.iter().enumerate() {
            let s = frame.sample_f32(ch, i);
            l += s * gl;
            r += s * gr;
        }
        pending.push(l);
        pending.push(r);
    }
}

/// Gains that fold `channels` into stereo.
///
/// Mono is duplicated to both sides. Otherwise left/right-side channels go to their
/// side, centre-ish channels to both at -3 dB, LFE is dropped; gains are scaled down
/// when a side would sum above unity.
fn stereo_mix(channels: Channels) -> Vec<(f32, f32)> {
    if channels.count() == 1 {
        return vec![(1.0, 1.0)];
    }
    let mut gains: Vec<(f32, f32)> = channels.iter().map(channel_gain).collect();
    let left: f32 = gains.iter().map(|g| g.0).sum();
    let right: f32 = gains.iter().map(|g| g.1).sum();
    let peak = left.max(right);
    if peak > 1.0 {
        for g in &mut gains {
            g.0 /= peak;
            g.1 /= peak;
        }
    }
    gains
}

fn channel_gain(ch: Channels) -> (f32, f32) {
    const LEFT: [Channels; 8] = [
        Channels::REAR_LEFT,
        Channels::FRONT_LEFT_CENTRE,
        Channels::SIDE_LEFT,
        Channels::TOP_FRONT_LEFT,
        Channels::TOP_REAR_LEFT,
        Channels::REAR_LEFT_CENTRE,
        Channels::FRONT_LEFT_WIDE,
        Channels::FRONT_LEFT_HIGH,
    ];
    const RIGHT: [Channels; 8] = [
        Channels::REAR_RIGHT,
        Channels::FRONT_RIGHT_CENTRE,
        Channels::SIDE_RIGHT,
        Channels::TOP_FRONT_RIGHT,
        Channels::TOP_REAR_RIGHT,
        Channels::REAR_RIGHT_CENTRE,
        Channels::FRONT_RIGHT_WIDE,
        Channels::FRONT_RIGHT_HIGH,
    ];

    if ch == Channels::FRONT_LEFT {
        (1.0, 0.0)
    } else if ch == Channels::FRONT_RIGHT {
        (0.0, 1.0)
    } else if ch == Channels::LFE1 || ch == Channels::LFE2 {
        (0.0, 0.0)
    } else if LEFT.contains(&ch) {
        (FRAC_1_SQRT_2, 0.0)
    } else if RIGHT.contains(&ch) {
        (0.0, FRAC_1_SQRT_2)
    } else {
        (FRAC_1_SQRT_2, FRAC_1_SQRT_2)
    }
}
