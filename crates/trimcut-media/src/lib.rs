//! Trimcut-Media: MP4 container parsing, demuxing, and muxing
//!
//! This crate provides the container layer for trimcut. It parses
//! MP4/ISO-BMFF files into per-track sample tables, exposes a demuxer
//! that yields samples in container-interleave order with keyframe-aligned
//! seeking, and a muxer that writes a new MP4 from a stream of samples
//! without touching the encoded payload bytes.
//!
//! # Modules
//!
//! - `mp4` - MP4 container parsing (moov, sample tables, avcC/esds)
//! - `demux` - Sample-level read access with sync-aligned seeking
//! - `mux` - MP4 writing with a register/start/write/stop protocol
//! - `format` - Track format descriptors exchanged between the two sides
//!
//! # Architecture
//!
//! Trimming never decodes frame content. The demuxer resolves every
//! sample's file offset, size, timing, and sync flag from the moov
//! sample tables up front; the muxer appends payload bytes into an open
//! mdat region and writes the moov with rebuilt sample tables when the
//! stream is finalized. Codec configuration (avcC/hvcC/esds) is carried
//! verbatim from source to destination so the output stays independently
//! decodable.

pub mod demux;
pub mod error;
pub mod format;
pub mod mp4;
pub mod mux;

pub use demux::Demuxer;
pub use error::{Error, Result};
pub use format::{Codec, SampleFlags, TrackFormat, TrackKind};
pub use mp4::Movie;
pub use mux::Muxer;
