//! Sample-level read access to an MP4 container.
//!
//! The demuxer owns the source handle for the duration of a trim; the
//! underlying file is closed on drop, on every exit path. Samples are
//! yielded in container-interleave order: among all selected tracks, the
//! sample with the smallest file offset is next, which matches the order
//! an interleaving muxer stored them in.

use crate::error::{Error, Result};
use crate::format::{SampleFlags, TrackFormat};
use crate::mp4::{us_to_ticks, ticks_to_us, Movie, TrackInfo};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Demuxer over a parsed MP4 source.
pub struct Demuxer<R> {
    reader: R,
    movie: Movie,
    /// Next sample index per track.
    cursors: Vec<usize>,
    /// Tracks marked active for reads.
    selected: Vec<bool>,
}

impl Demuxer<BufReader<File>> {
    /// Open and parse a source file.
    ///
    /// Fails when the path does not exist or the container cannot be
    /// parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> Demuxer<R> {
    /// Parse a source from any reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let movie = Movie::parse(&mut reader)?;
        let track_count = movie.tracks.len();
        Ok(Self {
            reader,
            movie,
            cursors: vec![0; track_count],
            selected: vec![false; track_count],
        })
    }

    /// Number of tracks in the source.
    pub fn track_count(&self) -> usize {
        self.movie.tracks.len()
    }

    /// The parsed movie, for callers that need raw track details.
    pub fn movie(&self) -> &Movie {
        &self.movie
    }

    fn track(&self, index: usize) -> Result<&TrackInfo> {
        self.movie.tracks.get(index).ok_or(Error::InvalidTrack {
            index,
            count: self.movie.tracks.len(),
        })
    }

    /// Format descriptor for a track.
    ///
    /// Fails for an out-of-range index or a track whose codec cannot be
    /// remuxed.
    pub fn track_format(&self, index: usize) -> Result<TrackFormat> {
        self.track(index)?.format()
    }

    /// Mark tracks as active for subsequent reads. Must precede seeking.
    pub fn select_tracks(&mut self, indices: &[usize]) -> Result<()> {
        for &index in indices {
            self.track(index)?;
            self.selected[index] = true;
        }
        Ok(())
    }

    /// Select every track in the source.
    pub fn select_all_tracks(&mut self) {
        self.selected.fill(true);
    }

    /// Position each selected track's cursor at the nearest sync sample
    /// at or before `timestamp_us`.
    ///
    /// Decode correctness requires reading from the preceding keyframe
    /// even when the trim window starts later; callers discard samples
    /// ahead of the window instead of writing them. A track with no
    /// samples is left at end-of-stream.
    pub fn seek_to_previous_sync(&mut self, timestamp_us: i64) {
        for (index, track) in self.movie.tracks.iter().enumerate() {
            if !self.selected[index] {
                continue;
            }
            let table = &track.sample_table;
            let target = us_to_ticks(timestamp_us, track.timescale);
            self.cursors[index] = match table.find_sample_at_or_before(target) {
                Some(at) => table.find_keyframe_at_or_before(at).unwrap_or(0) as usize,
                None => table.samples.len(),
            };
        }
    }

    /// The selected track owning the next sample in interleave order,
    /// with that sample; `None` at end-of-stream.
    fn current(&self) -> Option<(usize, &crate::mp4::SampleEntry)> {
        let mut next: Option<(usize, &crate::mp4::SampleEntry)> = None;
        for (index, track) in self.movie.tracks.iter().enumerate() {
            if !self.selected[index] {
                continue;
            }
            let Some(sample) = track.sample_table.samples.get(self.cursors[index]) else {
                continue;
            };
            if next.map_or(true, |(_, best)| sample.offset < best.offset) {
                next = Some((index, sample));
            }
        }
        next
    }

    /// Track index owning the next sample, or `None` at end-of-stream.
    pub fn current_track(&self) -> Option<usize> {
        self.current().map(|(index, _)| index)
    }

    /// Presentation timestamp of the current sample in microseconds.
    pub fn sample_time_us(&self) -> Option<i64> {
        self.current()
            .map(|(index, sample)| ticks_to_us(sample.pts(), self.movie.tracks[index].timescale))
    }

    /// Flags of the current sample.
    pub fn sample_flags(&self) -> SampleFlags {
        match self.current() {
            Some((_, sample)) if sample.is_keyframe => SampleFlags::SYNC,
            _ => SampleFlags::empty(),
        }
    }

    /// Read the current sample's payload into `buf`, returning its size.
    ///
    /// `buf` is resized to fit and can be reused across reads. Fails at
    /// end-of-stream or on an I/O error.
    pub fn read_sample(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let (offset, size) = match self.current() {
            Some((_, sample)) => (sample.offset, sample.size as usize),
            None => return Err(Error::invalid_mp4("read past end of stream")),
        };
        buf.resize(size, 0);
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(buf)?;
        Ok(size)
    }

    /// Move past the current sample, whether or not it was read.
    pub fn advance(&mut self) {
        if let Some(index) = self.current_track() {
            self.cursors[index] += 1;
        }
    }
}
