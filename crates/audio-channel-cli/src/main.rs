//! audio-channel: play a local file through the decode -> resample -> pull pipeline.
//!
//! ## Pipeline
//! 1. **Source**: a background thread demuxes the file with Symphonia into the packet queue.
//! 2. **Decode**: the decoder thread turns packets into frames on the frame queue.
//! 3. **Playback**: the CPAL callback pulls one frame at a time, resamples it to
//!    stereo S16LE at 44.1 kHz and writes it to the device.
//!
//! Ctrl-C stops the channel; `--status-json` prints the final status.

mod cli;
mod runtime;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,audio_channel=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match &args.cmd {
        Some(cli::Command::Play { path }) => runtime::run_play(&args, path),
        None => bail!("nothing to do: pass `play <path>` or --list-devices"),
    }
}
