//! Keyframe-aligned trimming of MP4 files without re-encoding.
//!
//! The engine demuxes every track of the source, seeks each track to
//! the last keyframe at or before the requested start, and copies
//! samples into a fresh container with timestamps rebased so the
//! output timeline begins at zero. Payload bytes are never touched;
//! cut points therefore land on keyframes, not exact timestamps.

use crate::error::{Result, TrimError};
use crate::output;
use std::fs;
use std::path::{Path, PathBuf};
use trimcut_media::{Demuxer, Muxer};

/// How the copy loop reacts to the first sample past the requested end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Each track stops independently once its own samples pass the
    /// end; every track covers the full window regardless of how the
    /// source interleaves them.
    #[default]
    PerTrack,
    /// The first sample past the end on any track stops the whole
    /// copy, truncating tracks whose samples happen to be laid out
    /// later in the file. Matches legacy extractor-style trimmers.
    FirstOverrun,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrimOptions {
    pub stop_policy: StopPolicy,
}

/// One trim job: source path plus a half-open-ish window in
/// microseconds. Samples with `start_us <= t <= end_us` are kept,
/// plus the leading keyframe run needed to decode the first frames.
#[derive(Debug, Clone)]
pub struct TrimRequest {
    pub source: PathBuf,
    pub start_us: i64,
    pub end_us: i64,
}

impl TrimRequest {
    pub fn new<P: Into<PathBuf>>(source: P, start_us: i64, end_us: i64) -> Self {
        Self {
            source: source.into(),
            start_us,
            end_us,
        }
    }

    /// Build a request from second-denominated times.
    ///
    /// Fails when either time is non-finite; a saturating float cast
    /// would otherwise turn NaN into 0 and infinity into `i64::MAX`
    /// and let the trim proceed. Range checks happen in validation.
    pub fn from_secs<P: Into<PathBuf>>(source: P, start_secs: f64, end_secs: f64) -> Result<Self> {
        if !start_secs.is_finite() || !end_secs.is_finite() {
            return Err(TrimError::InvalidArgument(format!(
                "times must be finite, got start={start_secs} end={end_secs}"
            )));
        }
        Ok(Self::new(
            source,
            (start_secs * 1_000_000.0) as i64,
            (end_secs * 1_000_000.0) as i64,
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(TrimError::InvalidArgument("source path is blank".into()));
        }
        if self.start_us < 0 {
            return Err(TrimError::InvalidArgument(format!(
                "start must be non-negative, got {}",
                self.start_us
            )));
        }
        if self.end_us <= self.start_us {
            return Err(TrimError::InvalidArgument(format!(
                "end ({}) must be after start ({})",
                self.end_us, self.start_us
            )));
        }
        Ok(())
    }
}

/// Trim executor. Owns the scratch directory where auto-named outputs
/// land and the options applied to every job.
pub struct Trimmer {
    scratch_dir: PathBuf,
    options: TrimOptions,
}

impl Default for Trimmer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trimmer {
    pub fn new() -> Self {
        Self {
            scratch_dir: output::default_scratch_dir(),
            options: TrimOptions::default(),
        }
    }

    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_options(mut self, options: TrimOptions) -> Self {
        self.options = options;
        self
    }

    /// Trim into an auto-named file under the scratch directory and
    /// return its path. A failed trim may leave a partial file behind.
    pub fn trim(&self, request: &TrimRequest) -> Result<PathBuf> {
        request.validate()?;
        fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| TrimError::DestinationOpen(e.into()))?;
        let dest = output::allocate_output_path(&self.scratch_dir);
        self.trim_to(request, &dest)?;
        Ok(dest)
    }

    /// Trim into an explicit destination path, replacing any existing
    /// file there.
    pub fn trim_to(&self, request: &TrimRequest, dest: &Path) -> Result<()> {
        request.validate()?;

        let mut demuxer = Demuxer::open(&request.source).map_err(TrimError::SourceOpen)?;
        tracing::debug!(
            source = %request.source.display(),
            tracks = demuxer.track_count(),
            start_us = request.start_us,
            end_us = request.end_us,
            "source opened"
        );
        if demuxer.track_count() == 0 {
            return Err(TrimError::SourceOpen(trimcut_media::Error::invalid_mp4(
                "source has no tracks",
            )));
        }

        let mut muxer = Muxer::create(dest).map_err(TrimError::DestinationOpen)?;

        // Source track index -> destination track index. Every source
        // track is carried; an unsupported codec fails the job.
        let mut track_map = Vec::with_capacity(demuxer.track_count());
        for index in 0..demuxer.track_count() {
            let format = demuxer.track_format(index).map_err(TrimError::InvalidTrack)?;
            tracing::debug!(track = index, codec = format.codec.name(), "registering track");
            let dest_index = muxer.add_track(format).map_err(TrimError::MuxerState)?;
            track_map.push(dest_index);
        }

        demuxer.select_all_tracks();
        demuxer.seek_to_previous_sync(request.start_us);
        muxer.start().map_err(TrimError::MuxerState)?;

        self.copy_window(&mut demuxer, &mut muxer, &track_map, request)?;

        muxer.stop().map_err(TrimError::MuxerFlush)?;
        tracing::debug!(dest = %dest.display(), "output finalized");
        Ok(())
    }

    fn copy_window<R, W>(
        &self,
        demuxer: &mut Demuxer<R>,
        muxer: &mut Muxer<W>,
        track_map: &[usize],
        request: &TrimRequest,
    ) -> Result<()>
    where
        R: std::io::Read + std::io::Seek,
        W: std::io::Write + std::io::Seek,
    {
        let mut buf = Vec::with_capacity(1 << 20);
        let mut done = vec![false; track_map.len()];
        let mut copied = 0u64;

        while let Some(track) = demuxer.current_track() {
            if done[track] {
                demuxer.advance();
                continue;
            }
            let Some(time_us) = demuxer.sample_time_us() else {
                break;
            };

            // The seek lands on the keyframe at or before the start;
            // samples before the window are dropped, not rebased.
            if time_us < request.start_us {
                demuxer.advance();
                continue;
            }
            if time_us > request.end_us {
                match self.options.stop_policy {
                    StopPolicy::FirstOverrun => break,
                    StopPolicy::PerTrack => {
                        done[track] = true;
                        if done.iter().all(|&d| d) {
                            break;
                        }
                        demuxer.advance();
                        continue;
                    }
                }
            }

            let flags = demuxer.sample_flags();
            demuxer.read_sample(&mut buf).map_err(TrimError::Read)?;

            let rebased = (time_us - request.start_us).max(0);
            muxer
                .write_sample(track_map[track], &buf, rebased, flags)
                .map_err(TrimError::MuxerState)?;
            copied += 1;
            demuxer.advance();
        }

        tracing::debug!(samples = copied, "window copied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_source_rejected() {
        let request = TrimRequest::new("", 0, 1_000_000);
        assert!(matches!(
            request.validate(),
            Err(TrimError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_end_not_after_start_rejected() {
        let request = TrimRequest::new("clip.mp4", 2_000_000, 2_000_000);
        assert!(matches!(
            request.validate(),
            Err(TrimError::InvalidArgument(_))
        ));

        let request = TrimRequest::new("clip.mp4", 2_000_000, 1_000_000);
        assert!(matches!(
            request.validate(),
            Err(TrimError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_negative_start_rejected() {
        let request = TrimRequest::new("clip.mp4", -1, 1_000_000);
        assert!(matches!(
            request.validate(),
            Err(TrimError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_valid_request_passes() {
        let request = TrimRequest::new("clip.mp4", 0, 1);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_non_finite_seconds_rejected() {
        for (start, end) in [
            (f64::NAN, 5.0),
            (0.0, f64::NAN),
            (0.0, f64::INFINITY),
            (f64::NEG_INFINITY, 1.0),
        ] {
            assert!(matches!(
                TrimRequest::from_secs("clip.mp4", start, end),
                Err(TrimError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_from_secs_converts_to_microseconds() {
        let request = TrimRequest::from_secs("clip.mp4", 1.5, 2.5).unwrap();
        assert_eq!(request.start_us, 1_500_000);
        assert_eq!(request.end_us, 2_500_000);
        assert!(request.validate().is_ok());
    }
}
