//! Read-only container inspection, for the `inspect` subcommand.

use crate::error::{Result, TrimError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use trimcut_media::mp4::Movie;

#[derive(Debug, Serialize)]
pub struct MediaReport {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub timescale: u32,
    pub tracks: Vec<TrackReport>,
}

#[derive(Debug, Serialize)]
pub struct TrackReport {
    pub index: usize,
    pub track_id: u32,
    pub kind: String,
    pub codec: String,
    pub timescale: u32,
    pub duration_secs: f64,
    pub sample_count: usize,
    pub sync_sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Worst-case trim granularity: the largest gap between sync
    /// samples, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_keyframe_interval_secs: Option<f64>,
}

/// Parse the container metadata without touching sample payloads.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<MediaReport> {
    let path = path.as_ref();
    let movie = Movie::open(path).map_err(TrimError::SourceOpen)?;

    let tracks = movie
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let sync_count = track
                .sample_table
                .samples
                .iter()
                .filter(|s| s.is_keyframe)
                .count();
            TrackReport {
                index,
                track_id: track.track_id,
                kind: track.handler_type.name().to_string(),
                codec: track
                    .codec
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                timescale: track.timescale,
                duration_secs: if track.timescale > 0 {
                    track.duration as f64 / track.timescale as f64
                } else {
                    0.0
                },
                sample_count: track.sample_table.samples.len(),
                sync_sample_count: sync_count,
                width: track.width,
                height: track.height,
                channels: track.channels,
                sample_rate: track.sample_rate,
                max_keyframe_interval_secs: track.max_keyframe_interval_secs(),
            }
        })
        .collect();

    Ok(MediaReport {
        path: path.to_path_buf(),
        duration_secs: movie.duration_secs(),
        timescale: movie.timescale,
        tracks,
    })
}
