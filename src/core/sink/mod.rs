//! Output devices that accept 8-bit signed mono samples
//!
//! A sink is used by exactly one thread at a time: the conductor opens and
//! starts it, hands it to the worker rendering the current note, gets it back
//! when the note completes, and finally drains and closes it.

mod device;
mod wav;

#[cfg(test)]
pub mod testing;

pub use self::device::DeviceSink;
pub use self::wav::WavSink;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("failed to open audio output: {0}")]
    Open(String),
    #[error("failed to start audio output: {0}")]
    Start(String),
    #[error("failed to write samples: {0}")]
    Write(String),
    #[error("failed to drain audio output: {0}")]
    Drain(String),
    #[error("failed to close audio output: {0}")]
    Close(String),
    #[error("audio output is not open")]
    NotOpen,
}

/// Blocking sample output
///
/// `write` returns once the samples have been accepted, which is what paces
/// playback in real time for device-backed sinks.
pub trait PlaybackSink: Send {
    fn open(&mut self) -> Result<(), SinkError>;

    fn start(&mut self) -> Result<(), SinkError>;

    fn write(&mut self, samples: &[i8]) -> Result<(), SinkError>;

    /// Block until everything written so far has been played
    fn drain(&mut self) -> Result<(), SinkError>;

    /// Release the device. Closing a sink that was never opened is a no-op.
    fn close(&mut self) -> Result<(), SinkError>;
}

pub type BoxedSink = Box<dyn PlaybackSink>;
