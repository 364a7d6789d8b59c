//! Command implementations: device listing and local file playback.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use audio_channel::AudioChannel;
use audio_channel::cpal_sink::CpalSinkFactory;
use audio_channel::decode::DecoderExit;
use audio_channel::device;
use audio_channel::source::FileSource;
use audio_channel::status::ChannelEvent;
use audio_channel_types::ChannelStatus;
use crossbeam_channel::Receiver;

use crate::cli::Args;

/// How a playback run ended from the controller's point of view.
#[derive(Debug, PartialEq, Eq)]
enum RunEnd {
    Drained,
    Interrupted,
    Failed,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for (i, d) in device::list_devices(&host)?.iter().enumerate() {
        let marker = if d.is_default { " [default]" } else { "" };
        println!(
            "#{i}: {}{marker} ({}-{} Hz, up to {} ch)",
            d.name, d.min_rate, d.max_rate, d.max_channels
        );
    }
    Ok(())
}

/// Play `path` through the selected device until it ends or ctrl-c.
pub fn run_play(args: &Args, path: &Path) -> Result<()> {
    let host = cpal::default_host();
    let device_name = normalize_device_name(args.device.clone());
    let device = device::pick_device(&host, device_name.as_deref())?;
    tracing::info!(device = %device::device_name(&device), "output device");

    let source = FileSource::open(path).with_context(|| format!("open {path:?}"))?;
    let codec = source.make_codec().context("create codec")?;
    tracing::info!(
        channels = source.spec().channel_count(),
        rate_hz = source.spec().rate,
        duration_ms = ?source.info().duration_ms,
        "source (local file)"
    );

    let mut channel = AudioChannel::new(
        source.spec(),
        source.time_base(),
        args.channel_config(),
        Box::new(codec),
    );
    let events = channel.events();

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let _ = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    });

    channel
        .play(&CpalSinkFactory::new(device))
        .context("start playback")?;
    let source_thread = source
        .spawn(channel.packet_queue())
        .context("spawn source thread")?;

    let end = wait_for_end(&events, &stop_rx);
    if end == RunEnd::Drained {
        // Let the device play out what it already holds.
        thread::sleep(Duration::from_millis(100));
    }
    channel.stop();

    match source_thread.join() {
        Ok(exit) => tracing::debug!(exit = ?exit, "source joined"),
        Err(_) => tracing::error!("source thread panicked"),
    }

    let status = channel.status();
    tracing::info!(
        end = ?end,
        relative_time_secs = ?status.relative_time_secs,
        bytes_played = status.bytes_played,
        "playback finished"
    );
    if args.status_json {
        print_status(&status)?;
    }
    Ok(())
}

fn wait_for_end(events: &Receiver<ChannelEvent>, stop: &Receiver<()>) -> RunEnd {
    loop {
        crossbeam_channel::select! {
            recv(events) -> ev => match ev {
                Ok(ChannelEvent::Drained) => return RunEnd::Drained,
                Ok(ChannelEvent::PlaybackFailed(msg)) => {
                    tracing::warn!("playback failed: {msg}");
                    return RunEnd::Failed;
                }
                Ok(ChannelEvent::DecoderExited(DecoderExit::Failed(msg))) => {
                    tracing::warn!("decoder failed: {msg}");
                    return RunEnd::Failed;
                }
                Ok(ChannelEvent::DecoderExited(exit)) => {
                    tracing::debug!(exit = ?exit, "decoder exited");
                }
                Err(_) => return RunEnd::Failed,
            },
            recv(stop) -> _ => {
                tracing::info!("interrupted");
                return RunEnd::Interrupted;
            }
        }
    }
}

fn print_status(status: &ChannelStatus) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(status)?);
    Ok(())
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
