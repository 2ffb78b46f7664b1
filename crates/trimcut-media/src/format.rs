//! Track format descriptors exchanged between the demuxer and muxer.
//!
//! A `TrackFormat` is registered with the muxer once per source track,
//! before writing starts. Codec configuration bytes are opaque to this
//! crate and copied verbatim from source to destination.

/// Codec carried by a track, identified by its stsd sample-entry fourcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// H.264 / AVC (`avc1`).
    H264,
    /// H.265 / HEVC (`hvc1` or `hev1`).
    H265,
    /// AAC audio (`mp4a`).
    Aac,
}

impl Codec {
    /// Map an stsd sample-entry fourcc to a known codec.
    pub fn from_fourcc(fourcc: [u8; 4]) -> Option<Self> {
        match &fourcc {
            b"avc1" => Some(Self::H264),
            b"hvc1" | b"hev1" => Some(Self::H265),
            b"mp4a" => Some(Self::Aac),
            _ => None,
        }
    }

    /// The sample-entry fourcc written for this codec.
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            Self::H264 => b"avc1",
            Self::H265 => b"hvc1",
            Self::Aac => b"mp4a",
        }
    }

    /// The configuration box fourcc nested inside the sample entry.
    pub fn config_fourcc(&self) -> &'static [u8; 4] {
        match self {
            Self::H264 => b"avcC",
            Self::H265 => b"hvcC",
            Self::Aac => b"esds",
        }
    }

    /// Short human-readable codec name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Aac => "aac",
        }
    }
}

/// Stream parameters that differ between video and audio tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackKind {
    Video { width: u32, height: u32 },
    Audio { channels: u16, sample_rate: u32 },
}

/// Format descriptor for one track.
///
/// The muxer requires the full set of descriptors before `start()`;
/// after that the set is immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    /// Video or audio parameters.
    pub kind: TrackKind,
    /// Codec identity.
    pub codec: Codec,
    /// Media timescale (time units per second).
    pub timescale: u32,
    /// Codec configuration payload (avcC, hvcC, or esds contents),
    /// copied verbatim.
    pub codec_data: Option<Vec<u8>>,
}

impl TrackFormat {
    /// Whether this is a video track.
    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video { .. })
    }
}

/// Per-sample flags carried from demux to mux unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleFlags(u32);

impl SampleFlags {
    /// The sample is a sync (key) sample and can be decoded without
    /// reference to prior samples.
    pub const SYNC: Self = Self(1);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether the sync bit is set.
    pub const fn is_sync(self) -> bool {
        self.0 & Self::SYNC.0 != 0
    }
}
