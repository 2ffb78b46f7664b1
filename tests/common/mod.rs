//! Shared fixtures for trim integration tests.
//!
//! Sources are synthesized through the media muxer so tests control
//! exact timestamps, keyframe placement, payload bytes, and how the
//! tracks interleave in the file.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trimcut_media::{Codec, Demuxer, Muxer, SampleFlags, TrackFormat, TrackKind};

/// Sample cadence for both tracks: one sample every 100ms.
pub const STEP_US: i64 = 100_000;
/// Video keyframes land on whole seconds.
pub const STEPS_PER_SEC: usize = 10;

pub struct Fixture {
    pub path: PathBuf,
    _dir: TempDir,
}

/// Materialize raw container bytes as an on-disk fixture.
pub fn fixture_from_bytes(bytes: &[u8]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.mp4");
    std::fs::write(&path, bytes).unwrap();
    Fixture { path, _dir: dir }
}

pub fn video_format() -> TrackFormat {
    TrackFormat {
        kind: TrackKind::Video {
            width: 640,
            height: 360,
        },
        codec: Codec::H264,
        timescale: 1000,
        codec_data: Some(vec![0x01, 0x64, 0x00, 0x1f, 0xff, 0xe1]),
    }
}

pub fn audio_format() -> TrackFormat {
    TrackFormat {
        kind: TrackKind::Audio {
            channels: 2,
            sample_rate: 48_000,
        },
        codec: Codec::Aac,
        timescale: 48_000,
        codec_data: Some(vec![0x12, 0x10]),
    }
}

pub fn video_payload(step: usize) -> Vec<u8> {
    vec![0x40u8.wrapping_add(step as u8); 800]
}

pub fn audio_payload(step: usize) -> Vec<u8> {
    vec![0xA0u8.wrapping_add(step as u8); 200]
}

fn video_flags(step: usize) -> SampleFlags {
    if step % STEPS_PER_SEC == 0 {
        SampleFlags::SYNC
    } else {
        SampleFlags::empty()
    }
}

/// Two-track source with video and audio alternating sample by sample,
/// the common interleave for progressive files.
pub fn two_track_fixture(seconds: usize) -> Fixture {
    build_fixture(seconds, |muxer, video, audio, steps| {
        for i in 0..steps {
            let t = i as i64 * STEP_US;
            muxer
                .write_sample(video, &video_payload(i), t, video_flags(i))
                .unwrap();
            muxer
                .write_sample(audio, &audio_payload(i), t, SampleFlags::SYNC)
                .unwrap();
        }
    })
}

/// Two-track source laid out in one-second blocks: all video samples
/// for a second, then all audio samples for the same second. Exposes
/// the difference between the stop policies.
pub fn block_interleaved_fixture(seconds: usize) -> Fixture {
    build_fixture(seconds, |muxer, video, audio, steps| {
        for second in 0..steps / STEPS_PER_SEC {
            let base = second * STEPS_PER_SEC;
            for i in base..base + STEPS_PER_SEC {
                let t = i as i64 * STEP_US;
                muxer
                    .write_sample(video, &video_payload(i), t, video_flags(i))
                    .unwrap();
            }
            for i in base..base + STEPS_PER_SEC {
                let t = i as i64 * STEP_US;
                muxer
                    .write_sample(audio, &audio_payload(i), t, SampleFlags::SYNC)
                    .unwrap();
            }
        }
    })
}

fn build_fixture<F>(seconds: usize, fill: F) -> Fixture
where
    F: FnOnce(&mut Muxer<std::io::BufWriter<std::fs::File>>, usize, usize, usize),
{
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.mp4");

    let mut muxer = Muxer::create(&path).unwrap();
    let video = muxer.add_track(video_format()).unwrap();
    let audio = muxer.add_track(audio_format()).unwrap();
    muxer.start().unwrap();
    fill(&mut muxer, video, audio, seconds * STEPS_PER_SEC);
    muxer.stop().unwrap();

    Fixture { path, _dir: dir }
}

/// One sample as seen by the demuxer, in container read order.
pub struct ReadSample {
    pub track: usize,
    pub time_us: i64,
    pub sync: bool,
    pub payload: Vec<u8>,
}

/// Demux every sample of a file in container order.
pub fn collect_samples(path: &Path) -> Vec<ReadSample> {
    let mut demuxer = Demuxer::open(path).unwrap();
    demuxer.select_all_tracks();

    let mut samples = Vec::new();
    let mut buf = Vec::new();
    while let Some(track) = demuxer.current_track() {
        let time_us = demuxer.sample_time_us().unwrap();
        let sync = demuxer.sample_flags().is_sync();
        demuxer.read_sample(&mut buf).unwrap();
        samples.push(ReadSample {
            track,
            time_us,
            sync,
            payload: buf.clone(),
        });
        demuxer.advance();
    }
    samples
}
