//! Trimcut - keyframe-aligned MP4 trimming without re-encoding
//!
//! This library crate exposes the trim engine for integration testing.

pub mod error;
pub mod inspect;
pub mod output;
pub mod trim;

pub use error::{Result, TrimError};
pub use trim::{StopPolicy, TrimOptions, TrimRequest, Trimmer};
