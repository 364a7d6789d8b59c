//! Hardware sink boundary.
//!
//! A sink is created from a [`SinkFactory`] for a fixed [`OutputSpec`], gets exactly one
//! pull callback, and is then switched between playing and paused. The callback runs on
//! the sink's own thread and hands PCM back through a [`BufferQueue`].

use crate::error::Result;
use crate::format::OutputSpec;

/// Where the pull callback puts the bytes it produced.
pub trait BufferQueue {
    /// Queue interleaved S16LE PCM for output.
    fn enqueue(&mut self, pcm: &[u8]);
}

/// Invoked by the sink whenever it wants more audio. Enqueuing nothing is allowed.
pub type PullCallback = Box<dyn FnMut(&mut dyn BufferQueue) + Send>;

/// An output created for one channel.
pub trait Sink {
    /// Install the pull callback. Must be called once, before [`Sink::set_playing`].
    fn register_pull_callback(&mut self, callback: PullCallback) -> Result<()>;

    fn set_playing(&mut self, playing: bool) -> Result<()>;
}

/// Creates sinks. Each call returns an independent handle.
pub trait SinkFactory {
    fn create(&self, spec: &OutputSpec) -> Result<Box<dyn Sink>>;
}
