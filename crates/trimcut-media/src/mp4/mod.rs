//! MP4 container parsing.
//!
//! Parses the moov atom of an MP4/ISO-BMFF file into per-track sample
//! tables, which give the demuxer random access to every sample's file
//! offset, size, timing, and sync flag.

mod atoms;
mod reader;
mod sample_table;

pub use atoms::{Atom, AtomType, HandlerType, TrackInfo};
pub use reader::Mp4Reader;
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};

use crate::Result;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Convert a duration in media timescale ticks to microseconds.
pub fn ticks_to_us(ticks: u64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (ticks as i128 * 1_000_000 / timescale as i128) as i64
}

/// Convert microseconds to media timescale ticks, clamping at zero.
pub fn us_to_ticks(us: i64, timescale: u32) -> u64 {
    (us.max(0) as i128 * timescale as i128 / 1_000_000) as u64
}

/// Parsed MP4 file with every track's sample table resolved.
#[derive(Debug)]
pub struct Movie {
    /// Duration in movie timescale units.
    pub duration: u64,
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// All tracks, in moov order.
    pub tracks: Vec<TrackInfo>,
}

impl Movie {
    /// Parse an MP4 file from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::parse(&mut reader)
    }

    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Mp4Reader::new(reader).parse()
    }

    /// Get the movie duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_duration() {
        let movie = Movie {
            duration: 120000,
            timescale: 1000,
            tracks: Vec::new(),
        };
        assert!((movie.duration_secs() - 120.0).abs() < 0.001);
    }

    #[test]
    fn test_movie_zero_timescale() {
        let movie = Movie {
            duration: 120000,
            timescale: 0,
            tracks: Vec::new(),
        };
        assert_eq!(movie.duration_secs(), 0.0);
    }

    #[test]
    fn test_ticks_to_us() {
        assert_eq!(ticks_to_us(90000, 90000), 1_000_000);
        assert_eq!(ticks_to_us(100, 1000), 100_000);
        assert_eq!(ticks_to_us(1, 0), 0);
    }

    #[test]
    fn test_us_to_ticks() {
        assert_eq!(us_to_ticks(1_000_000, 90000), 90000);
        assert_eq!(us_to_ticks(100_000, 48000), 4800);
        // Negative input clamps to zero rather than wrapping.
        assert_eq!(us_to_ticks(-5, 1000), 0);
    }

    #[test]
    fn test_tick_round_trip() {
        for us in [0i64, 40_000, 100_000, 2_000_000] {
            assert_eq!(ticks_to_us(us_to_ticks(us, 1_000_000), 1_000_000), us);
        }
    }
}
