//! MP4 muxer with a write-then-close protocol.
//!
//! Call order is enforced: register every track with `add_track`, then
//! `start()`, then any number of `write_sample` calls, then `stop()`.
//! Payload bytes are appended to an open mdat region as they arrive;
//! `stop()` patches the mdat size and writes a moov with sample tables
//! rebuilt from the written timestamps, sizes, and sync flags.
//!
//! Timestamps per track must be non-decreasing; out-of-order writes are
//! rejected. A destination dropped without a successful `stop()` is a
//! partial file and not guaranteed to be a valid container.

use crate::error::{Error, Result};
use crate::format::{SampleFlags, TrackFormat, TrackKind};
use crate::mp4::{ticks_to_us, us_to_ticks};
use bytes::{BufMut, BytesMut};
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Movie-level timescale written into mvhd.
const MOVIE_TIMESCALE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Configuring,
    Writing,
    Finalized,
}

/// Bookkeeping for one written sample; payload bytes are already in the
/// mdat region by the time this is recorded.
struct PendingSample {
    offset: u64,
    size: u32,
    time_us: i64,
    sync: bool,
}

struct MuxTrack {
    format: TrackFormat,
    samples: Vec<PendingSample>,
}

/// MP4 muxer over any seekable writer.
pub struct Muxer<W> {
    writer: W,
    state: State,
    tracks: Vec<MuxTrack>,
    /// File offset of the mdat box header, patched in `stop()`.
    mdat_offset: u64,
}

impl Muxer<BufWriter<File>> {
    /// Create the destination file, deleting any pre-existing file at
    /// the target path first (no append semantics).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path)?;
        }
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Seek> Muxer<W> {
    /// Wrap a seekable writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            state: State::Configuring,
            tracks: Vec::new(),
            mdat_offset: 0,
        }
    }

    /// Register a track, returning its destination index.
    ///
    /// All tracks must be registered before `start()`.
    pub fn add_track(&mut self, format: TrackFormat) -> Result<usize> {
        if self.state != State::Configuring {
            return Err(Error::MuxerState("add_track after start"));
        }
        self.tracks.push(MuxTrack {
            format,
            samples: Vec::new(),
        });
        Ok(self.tracks.len() - 1)
    }

    /// Finalize track registration and open the mdat payload region.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Configuring {
            return Err(Error::MuxerState("start called twice"));
        }
        if self.tracks.is_empty() {
            return Err(Error::MuxerState("start with no tracks registered"));
        }

        let mut buf = BytesMut::with_capacity(40);
        write_ftyp(&mut buf);
        self.writer.write_all(&buf)?;

        // Largesize mdat header; the 64-bit size is patched in stop().
        self.mdat_offset = self.writer.stream_position()?;
        let mut header = [0u8; 16];
        header[3] = 1;
        header[4..8].copy_from_slice(b"mdat");
        self.writer.write_all(&header)?;

        self.state = State::Writing;
        Ok(())
    }

    /// Append one sample's payload for a track.
    ///
    /// `timestamp_us` is the presentation time in the output timeline;
    /// it must be non-negative and non-decreasing per track. Flags are
    /// recorded as given.
    pub fn write_sample(
        &mut self,
        track: usize,
        payload: &[u8],
        timestamp_us: i64,
        flags: SampleFlags,
    ) -> Result<()> {
        if self.state != State::Writing {
            return Err(Error::MuxerState("write_sample outside start/stop"));
        }
        let count = self.tracks.len();
        let Some(entry) = self.tracks.get_mut(track) else {
            return Err(Error::InvalidTrack {
                index: track,
                count,
            });
        };
        if timestamp_us < 0 {
            return Err(Error::MuxerState("negative sample timestamp"));
        }
        if let Some(last) = entry.samples.last() {
            if timestamp_us < last.time_us {
                return Err(Error::OutOfOrderSample {
                    track,
                    timestamp_us,
                    last_us: last.time_us,
                });
            }
        }

        let offset = self.writer.stream_position()?;
        self.writer.write_all(payload)?;
        entry.samples.push(PendingSample {
            offset,
            size: payload.len() as u32,
            time_us: timestamp_us,
            sync: flags.is_sync(),
        });
        Ok(())
    }

    /// Patch the mdat size, write the moov, and flush.
    ///
    /// Fails if any registered track received no samples; the container
    /// cannot describe an empty track's timing.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Writing {
            return Err(Error::MuxerState("stop outside start/finalize window"));
        }
        for (index, track) in self.tracks.iter().enumerate() {
            if track.samples.is_empty() {
                return Err(Error::EmptyTrack(index));
            }
        }

        let mdat_end = self.writer.stream_position()?;
        let mdat_size = mdat_end - self.mdat_offset;
        self.writer.seek(SeekFrom::Start(self.mdat_offset + 8))?;
        self.writer.write_all(&mdat_size.to_be_bytes())?;
        self.writer.seek(SeekFrom::Start(mdat_end))?;

        let moov = self.build_moov();
        self.writer.write_all(&moov)?;
        self.writer.flush()?;

        self.state = State::Finalized;
        Ok(())
    }

    /// Consume the muxer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn build_moov(&self) -> BytesMut {
        let timings: Vec<TrackTiming> = self.tracks.iter().map(TrackTiming::resolve).collect();
        let movie_duration_us = self
            .tracks
            .iter()
            .zip(&timings)
            .map(|(t, timing)| ticks_to_us(timing.duration_ticks, t.format.timescale))
            .max()
            .unwrap_or(0);
        let movie_duration = us_to_ticks(movie_duration_us, MOVIE_TIMESCALE);

        let mut buf = BytesMut::with_capacity(1024);
        let moov = begin_box(&mut buf, b"moov");
        self.write_mvhd(&mut buf, movie_duration);
        for (index, (track, timing)) in self.tracks.iter().zip(&timings).enumerate() {
            let movie_units =
                us_to_ticks(ticks_to_us(timing.duration_ticks, track.format.timescale), MOVIE_TIMESCALE);
            write_trak(&mut buf, track, timing, index as u32 + 1, movie_units);
        }
        finish_box(&mut buf, moov);
        buf
    }

    fn write_mvhd(&self, buf: &mut BytesMut, duration: u64) {
        buf.put_u32(120); // fixed size, version 1
        buf.put_slice(b"mvhd");
        buf.put_u8(1); // version 1
        buf.put_slice(&[0, 0, 0]); // flags
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        buf.put_u32(MOVIE_TIMESCALE);
        buf.put_u64(duration);
        buf.put_u32(0x00010000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_u16(0); // reserved
        buf.put_u64(0); // reserved
        put_identity_matrix(buf);
        for _ in 0..6 {
            buf.put_u32(0); // pre-defined
        }
        buf.put_u32(self.tracks.len() as u32 + 1); // next track ID
    }
}

/// Per-track timing resolved from the written sample times.
struct TrackTiming {
    /// Duration per sample in ticks.
    durations: Vec<u32>,
    /// Track duration in ticks.
    duration_ticks: u64,
}

impl TrackTiming {
    fn resolve(track: &MuxTrack) -> Self {
        let timescale = track.format.timescale;
        let ticks: Vec<u64> = track
            .samples
            .iter()
            .map(|s| us_to_ticks(s.time_us, timescale))
            .collect();

        // The last sample's duration is unknowable from timestamps
        // alone; repeat the previous delta.
        let mut durations: Vec<u32> = ticks
            .windows(2)
            .map(|w| (w[1] - w[0]) as u32)
            .collect();
        durations.push(durations.last().copied().unwrap_or(1));

        let duration_ticks = ticks.last().copied().unwrap_or(0)
            + durations.last().copied().unwrap_or(0) as u64;

        Self {
            durations,
            duration_ticks,
        }
    }
}

/// Start a size-patched box: write a placeholder size and the fourcc,
/// returning the offset to patch in `finish_box`.
fn begin_box(buf: &mut BytesMut, fourcc: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(fourcc);
    start
}

fn finish_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

fn write_ftyp(buf: &mut BytesMut) {
    let brands: [&[u8; 4]; 4] = [b"isom", b"iso2", b"avc1", b"mp41"];
    buf.put_u32((16 + brands.len() * 4) as u32);
    buf.put_slice(b"ftyp");
    buf.put_slice(b"isom"); // major brand
    buf.put_u32(0x200); // minor version
    for brand in brands {
        buf.put_slice(brand);
    }
}

fn write_trak(
    buf: &mut BytesMut,
    track: &MuxTrack,
    timing: &TrackTiming,
    track_id: u32,
    movie_duration: u64,
) {
    let trak = begin_box(buf, b"trak");
    write_tkhd(buf, &track.format, track_id, movie_duration);

    let mdia = begin_box(buf, b"mdia");
    write_mdhd(buf, track.format.timescale, timing.duration_ticks);
    match track.format.kind {
        TrackKind::Video { .. } => write_hdlr(buf, b"vide", b"VideoHandler"),
        TrackKind::Audio { .. } => write_hdlr(buf, b"soun", b"SoundHandler"),
    }

    let minf = begin_box(buf, b"minf");
    match track.format.kind {
        TrackKind::Video { .. } => {
            // vmhd
            buf.put_u32(20);
            buf.put_slice(b"vmhd");
            buf.put_u32(1); // version/flags
            buf.put_u64(0); // graphics mode + opcolor
        }
        TrackKind::Audio { .. } => {
            // smhd
            buf.put_u32(16);
            buf.put_slice(b"smhd");
            buf.put_u32(0); // version/flags
            buf.put_u32(0); // balance + reserved
        }
    }
    write_dinf(buf);
    write_stbl(buf, track, timing);
    finish_box(buf, minf);

    finish_box(buf, mdia);
    finish_box(buf, trak);
}

fn write_tkhd(buf: &mut BytesMut, format: &TrackFormat, track_id: u32, duration: u64) {
    buf.put_u32(104); // fixed size, version 1
    buf.put_slice(b"tkhd");
    buf.put_u8(1); // version 1
    buf.put_slice(&[0, 0, 7]); // flags: enabled, in_movie, in_preview
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(track_id);
    buf.put_u32(0); // reserved
    buf.put_u64(duration);
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(if format.is_video() { 0 } else { 0x0100 }); // volume
    buf.put_u16(0); // reserved
    put_identity_matrix(buf);
    match format.kind {
        TrackKind::Video { width, height } => {
            buf.put_u32(width << 16); // 16.16 fixed point
            buf.put_u32(height << 16);
        }
        TrackKind::Audio { .. } => {
            buf.put_u32(0);
            buf.put_u32(0);
        }
    }
}

fn write_mdhd(buf: &mut BytesMut, timescale: u32, duration: u64) {
    buf.put_u32(44); // fixed size, version 1
    buf.put_slice(b"mdhd");
    buf.put_u8(1); // version 1
    buf.put_slice(&[0, 0, 0]); // flags
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(timescale);
    buf.put_u64(duration);
    buf.put_u16(0x55C4); // language: und
    buf.put_u16(0); // pre_defined
}

fn write_hdlr(buf: &mut BytesMut, handler: &[u8; 4], name: &[u8]) {
    buf.put_u32((32 + name.len() + 1) as u32);
    buf.put_slice(b"hdlr");
    buf.put_u32(0); // version/flags
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler);
    buf.put_u32(0); // reserved
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_slice(name);
    buf.put_u8(0); // null terminator
}

fn write_dinf(buf: &mut BytesMut) {
    buf.put_u32(36);
    buf.put_slice(b"dinf");

    // dref with one self-contained url entry
    buf.put_u32(28);
    buf.put_slice(b"dref");
    buf.put_u32(0); // version/flags
    buf.put_u32(1); // entry count
    buf.put_u32(12);
    buf.put_slice(b"url ");
    buf.put_u32(1); // flags: self-contained
}

fn write_stbl(buf: &mut BytesMut, track: &MuxTrack, timing: &TrackTiming) {
    let stbl = begin_box(buf, b"stbl");

    write_stsd(buf, &track.format);
    write_stts(buf, &timing.durations);
    // Absent stss means every sample is sync; only written when that is
    // not the case.
    if track.samples.iter().any(|s| !s.sync) {
        write_stss(buf, &track.samples);
    }
    write_stsc(buf);
    write_stsz(buf, &track.samples);
    write_chunk_offsets(buf, &track.samples);

    finish_box(buf, stbl);
}

fn write_stsd(buf: &mut BytesMut, format: &TrackFormat) {
    let stsd = begin_box(buf, b"stsd");
    buf.put_u32(0); // version/flags
    buf.put_u32(1); // entry count

    let entry = begin_box(buf, format.codec.fourcc());
    match format.kind {
        TrackKind::Video { width, height } => {
            buf.put_slice(&[0; 6]); // reserved
            buf.put_u16(1); // data reference index
            buf.put_u16(0); // pre_defined
            buf.put_u16(0); // reserved
            buf.put_slice(&[0; 12]); // pre_defined
            buf.put_u16(width as u16);
            buf.put_u16(height as u16);
            buf.put_u32(0x00480000); // horiz resolution 72 dpi
            buf.put_u32(0x00480000); // vert resolution 72 dpi
            buf.put_u32(0); // reserved
            buf.put_u16(1); // frame count
            buf.put_slice(&[0; 32]); // compressor name
            buf.put_u16(0x0018); // depth
            buf.put_i16(-1); // pre_defined
        }
        TrackKind::Audio {
            channels,
            sample_rate,
        } => {
            buf.put_slice(&[0; 6]); // reserved
            buf.put_u16(1); // data reference index
            buf.put_u64(0); // version/revision/vendor
            buf.put_u16(channels);
            buf.put_u16(16); // sample size
            buf.put_u16(0); // compression id
            buf.put_u16(0); // packet size
            buf.put_u32(sample_rate << 16); // 16.16 fixed point
        }
    }

    // Codec configuration copied verbatim from the source track.
    if let Some(ref config) = format.codec_data {
        buf.put_u32((8 + config.len()) as u32);
        buf.put_slice(format.codec.config_fourcc());
        buf.put_slice(config);
    }

    finish_box(buf, entry);
    finish_box(buf, stsd);
}

fn write_stts(buf: &mut BytesMut, durations: &[u32]) {
    // Run-length encode equal consecutive durations.
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &delta in durations {
        match runs.last_mut() {
            Some((count, last)) if *last == delta => *count += 1,
            _ => runs.push((1, delta)),
        }
    }

    let stts = begin_box(buf, b"stts");
    buf.put_u32(0); // version/flags
    buf.put_u32(runs.len() as u32);
    for (count, delta) in runs {
        buf.put_u32(count);
        buf.put_u32(delta);
    }
    finish_box(buf, stts);
}

fn write_stss(buf: &mut BytesMut, samples: &[PendingSample]) {
    let sync: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.sync)
        .map(|(i, _)| i as u32 + 1) // 1-based sample numbers
        .collect();

    let stss = begin_box(buf, b"stss");
    buf.put_u32(0); // version/flags
    buf.put_u32(sync.len() as u32);
    for number in sync {
        buf.put_u32(number);
    }
    finish_box(buf, stss);
}

fn write_stsc(buf: &mut BytesMut) {
    // One sample per chunk: a single run covering every chunk.
    buf.put_u32(28);
    buf.put_slice(b"stsc");
    buf.put_u32(0); // version/flags
    buf.put_u32(1); // entry count
    buf.put_u32(1); // first chunk
    buf.put_u32(1); // samples per chunk
    buf.put_u32(1); // sample description index
}

fn write_stsz(buf: &mut BytesMut, samples: &[PendingSample]) {
    let stsz = begin_box(buf, b"stsz");
    buf.put_u32(0); // version/flags
    buf.put_u32(0); // uniform size: per-sample sizes follow
    buf.put_u32(samples.len() as u32);
    for sample in samples {
        buf.put_u32(sample.size);
    }
    finish_box(buf, stsz);
}

fn write_chunk_offsets(buf: &mut BytesMut, samples: &[PendingSample]) {
    // With one sample per chunk the chunk offsets are the sample
    // offsets; stco when they fit in 32 bits, co64 otherwise.
    let wide = samples
        .iter()
        .any(|s| s.offset > u32::MAX as u64);

    let boxref = begin_box(buf, if wide { b"co64" } else { b"stco" });
    buf.put_u32(0); // version/flags
    buf.put_u32(samples.len() as u32);
    for sample in samples {
        if wide {
            buf.put_u64(sample.offset);
        } else {
            buf.put_u32(sample.offset as u32);
        }
    }
    finish_box(buf, boxref);
}
