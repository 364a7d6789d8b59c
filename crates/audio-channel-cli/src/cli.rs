use std::path::PathBuf;

use audio_channel::ChannelConfig;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "audio-channel", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Encoded packets buffered ahead of the decoder (0 = unbounded)
    #[arg(long, default_value_t = 64)]
    pub packet_queue_depth: usize,

    /// Decoded frames buffered ahead of playback (0 = unbounded)
    #[arg(long, default_value_t = 32)]
    pub frame_queue_depth: usize,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Print the final channel status as JSON
    #[arg(long)]
    pub status_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a local file
    Play {
        /// Path to audio file
        path: PathBuf,
    },
}

impl Args {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            packet_queue_depth: self.packet_queue_depth,
            frame_queue_depth: self.frame_queue_depth,
            resample_chunk_frames: self.chunk_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_channel_config() {
        let args = Args::try_parse_from(["audio-channel", "play", "song.flac"]).unwrap();
        assert_eq!(args.channel_config(), ChannelConfig::default());
        assert!(!args.status_json);
        match args.cmd {
            Some(Command::Play { path }) => assert_eq!(path, PathBuf::from("song.flac")),
            None => panic!("expected play"),
        }
    }

    #[test]
    fn parses_tuning_flags() {
        let args = Args::try_parse_from([
            "audio-channel",
            "--device",
            "usb",
            "--packet-queue-depth",
            "8",
            "--frame-queue-depth",
            "0",
            "--chunk-frames",
            "512",
            "--status-json",
            "play",
            "a.wav",
        ])
        .unwrap();
        assert_eq!(args.device.as_deref(), Some("usb"));
        let config = args.channel_config();
        assert_eq!(config.packet_queue_depth, 8);
        assert_eq!(config.frame_queue_depth, 0);
        assert_eq!(config.resample_chunk_frames, 512);
        assert!(args.status_json);
    }

    #[test]
    fn list_devices_needs_no_subcommand() {
        let args = Args::try_parse_from(["audio-channel", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
    }
}
