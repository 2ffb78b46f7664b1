//! Error taxonomy for the trim pipeline.
//!
//! Every failure mode maps to one of two stable boundary codes:
//! `INVALID_ARGS` for request validation failures, `TRIM_FAILED` for
//! anything that goes wrong after validation passes.

use thiserror::Error;
use trimcut_media::Error as MediaError;

#[derive(Debug, Error)]
pub enum TrimError {
    /// Request rejected before any I/O happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source file could not be opened or parsed as MP4.
    #[error("failed to open source: {0}")]
    SourceOpen(#[source] MediaError),

    /// A source track could not be carried into the output.
    #[error("unusable source track: {0}")]
    InvalidTrack(#[source] MediaError),

    /// A sample could not be read from the source.
    #[error("failed to read sample: {0}")]
    Read(#[source] MediaError),

    /// The destination file could not be created.
    #[error("failed to open destination: {0}")]
    DestinationOpen(#[source] MediaError),

    /// The muxer rejected a call (protocol violation or bad sample).
    #[error("muxer rejected operation: {0}")]
    MuxerState(#[source] MediaError),

    /// The output could not be finalized; the destination is a partial
    /// file and should not be treated as a valid container.
    #[error("failed to finalize output: {0}")]
    MuxerFlush(#[source] MediaError),
}

impl TrimError {
    /// Stable machine-readable code for callers that dispatch on
    /// failure class rather than message text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGS",
            _ => "TRIM_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, TrimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_codes() {
        let err = TrimError::InvalidArgument("end before start".into());
        assert_eq!(err.code(), "INVALID_ARGS");

        let err = TrimError::Read(MediaError::invalid_mp4("truncated"));
        assert_eq!(err.code(), "TRIM_FAILED");
    }
}
