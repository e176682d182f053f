//! Audio output seam used by the queue engine.
//!
//! The engine only needs to load a track, drive play/pause/seek and learn when
//! the loaded track ran out. `RodioOutput` does that on the default device.

mod sink;

#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use sink::RodioOutput;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no audio output device: {0}")]
    Device(String),
    #[error("cannot play {0}: only local files are supported")]
    Unplayable(String),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("seek failed: {0}")]
    Seek(String),
}

/// Something that can play one track at a time.
pub trait PlaybackOutput {
    /// Replace the current track with `key`, paused at position 0.
    fn load(&mut self, key: &str) -> Result<(), OutputError>;
    fn play(&mut self);
    fn pause(&mut self);
    /// Drop whatever is loaded.
    fn stop(&mut self);
    fn seek(&mut self, seconds: f64) -> Result<(), OutputError>;
    /// Seconds into the loaded track.
    fn elapsed(&self) -> f64;
    /// Length of the loaded track, when the decoder knows it.
    fn duration(&self) -> Option<f64>;
    fn set_volume(&mut self, volume: f32);
    /// True once the loaded track has played out (or nothing is loaded).
    fn is_finished(&self) -> bool;
}
