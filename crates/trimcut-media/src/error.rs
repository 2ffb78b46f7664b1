//! Error types for trimcut-media.

use std::io;
use thiserror::Error;

/// Result type for trimcut-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for trimcut-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Unsupported feature or codec.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Track index out of range.
    #[error("Invalid track index: {index} (track count: {count})")]
    InvalidTrack { index: usize, count: usize },

    /// Muxer call-order protocol violation.
    #[error("Muxer state: {0}")]
    MuxerState(&'static str),

    /// Sample timestamps for a track must be non-decreasing.
    #[error("Out-of-order sample on track {track}: {timestamp_us}us after {last_us}us")]
    OutOfOrderSample {
        track: usize,
        timestamp_us: i64,
        last_us: i64,
    },

    /// A registered track received no samples before finalization.
    #[error("Track {0} received no samples")]
    EmptyTrack(usize),
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
