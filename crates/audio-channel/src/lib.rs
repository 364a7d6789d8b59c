//! Real-time audio channel: decode encoded packets, convert them to stereo S16LE at
//! 44.1 kHz and feed a pull-driven output sink.

pub mod channel;
pub mod clock;
pub mod codec;
pub mod config;
pub mod cpal_sink;
pub mod decode;
pub mod device;
pub mod error;
pub mod format;
pub mod frame;
pub mod playback;
pub mod queue;
pub mod resample;
pub mod sink;
pub mod source;
pub mod state;
pub mod status;

pub use channel::AudioChannel;
pub use config::ChannelConfig;
pub use error::{Error, Result};
