//! MP4 atom definitions.

use super::{ticks_to_us, SampleTable};
use crate::error::Error;
use crate::format::{Codec, TrackFormat, TrackKind};
use crate::Result;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// File offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    /// Short human-readable handler name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Hint => "hint",
            Self::Meta => "meta",
            Self::Text => "text",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Track information extracted from a trak atom.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track ID.
    pub track_id: u32,
    /// Handler type (video/audio/etc).
    pub handler_type: HandlerType,
    /// Track duration in media timescale.
    pub duration: u64,
    /// Media timescale (time units per second for this track).
    pub timescale: u32,
    /// Sample table with all sample info.
    pub sample_table: SampleTable,
    /// Codec identity from the stsd sample-entry fourcc, if recognized.
    pub codec: Option<Codec>,
    /// Codec configuration data (avcC, hvcC, or esds contents).
    pub codec_data: Option<Vec<u8>>,
    /// Width (for video tracks).
    pub width: Option<u32>,
    /// Height (for video tracks).
    pub height: Option<u32>,
    /// Sample rate (for audio tracks).
    pub sample_rate: Option<u32>,
    /// Channel count (for audio tracks).
    pub channels: Option<u16>,
}

impl TrackInfo {
    /// Create empty track info.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            duration: 0,
            timescale: 1,
            sample_table: SampleTable::default(),
            codec: None,
            codec_data: None,
            width: None,
            height: None,
            sample_rate: None,
            channels: None,
        }
    }

    /// Get duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// Build the format descriptor registered with a muxer for this track.
    ///
    /// Fails with `Unsupported` when the track's handler or codec cannot
    /// be carried into the output container.
    pub fn format(&self) -> Result<TrackFormat> {
        let codec = self.codec.ok_or_else(|| {
            Error::unsupported(format!(
                "track {}: no recognized codec sample entry",
                self.track_id
            ))
        })?;

        let kind = match self.handler_type {
            HandlerType::Video => TrackKind::Video {
                width: self.width.unwrap_or(0),
                height: self.height.unwrap_or(0),
            },
            HandlerType::Audio => TrackKind::Audio {
                channels: self.channels.unwrap_or(2),
                sample_rate: self.sample_rate.unwrap_or(48000),
            },
            other => {
                return Err(Error::unsupported(format!(
                    "track {}: {} tracks cannot be remuxed",
                    self.track_id,
                    other.name()
                )))
            }
        };

        Ok(TrackFormat {
            kind,
            codec,
            timescale: self.timescale,
            codec_data: self.codec_data.clone(),
        })
    }

    /// Largest gap between consecutive sync samples, in seconds.
    ///
    /// Returns `None` when the track has fewer than two sync samples or
    /// no usable timescale.
    pub fn max_keyframe_interval_secs(&self) -> Option<f64> {
        if self.timescale == 0 {
            return None;
        }

        let sync_dts: Vec<u64> = self
            .sample_table
            .iter()
            .filter(|s| s.is_keyframe)
            .map(|s| s.dts)
            .collect();
        if sync_dts.len() < 2 {
            return None;
        }

        let max_gap = sync_dts.windows(2).map(|w| w[1].saturating_sub(w[0])).max()?;
        Some(ticks_to_us(max_gap, self.timescale) as f64 / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::SampleEntry;

    fn sample(index: u32, dts: u64, is_keyframe: bool) -> SampleEntry {
        SampleEntry {
            index,
            offset: index as u64 * 100,
            size: 100,
            dts,
            cts_offset: 0,
            is_keyframe,
        }
    }

    #[test]
    fn test_atom_type_display() {
        assert_eq!(AtomType::MOOV.to_string(), "moov");
        assert_eq!(AtomType::from_bytes([0xff, 0, 0, 0]).as_str(), "????");
    }

    #[test]
    fn test_handler_type_from_bytes() {
        assert!(HandlerType::from_bytes(*b"vide").is_video());
        assert!(HandlerType::from_bytes(*b"soun").is_audio());
        assert_eq!(HandlerType::from_bytes(*b"subt").name(), "unknown");
    }

    #[test]
    fn test_format_requires_codec() {
        let mut track = TrackInfo::new(1);
        track.handler_type = HandlerType::Video;
        assert!(matches!(track.format(), Err(Error::Unsupported(_))));

        track.codec = Some(Codec::H264);
        track.width = Some(1920);
        track.height = Some(1080);
        let format = track.format().unwrap();
        assert_eq!(
            format.kind,
            TrackKind::Video {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn test_format_rejects_unsupported_handler() {
        let mut track = TrackInfo::new(3);
        track.handler_type = HandlerType::Text;
        track.codec = Some(Codec::H264);
        assert!(matches!(track.format(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_max_keyframe_interval() {
        let mut track = TrackInfo::new(1);
        track.timescale = 1000;
        track.sample_table = SampleTable {
            sample_count: 6,
            samples: vec![
                sample(0, 0, true),
                sample(1, 1000, false),
                sample(2, 2000, true),
                sample(3, 3000, false),
                sample(4, 4000, false),
                sample(5, 5000, true),
            ],
        };

        // Largest gap is between the sync samples at 2s and 5s.
        let interval = track.max_keyframe_interval_secs().unwrap();
        assert!((interval - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_max_keyframe_interval_single_sync() {
        let mut track = TrackInfo::new(1);
        track.timescale = 1000;
        track.sample_table = SampleTable {
            sample_count: 2,
            samples: vec![sample(0, 0, true), sample(1, 1000, false)],
        };
        assert!(track.max_keyframe_interval_secs().is_none());
    }
}
