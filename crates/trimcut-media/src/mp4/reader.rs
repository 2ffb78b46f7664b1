//! MP4 file reader with atom parsing.

use super::{Atom, AtomType, HandlerType, Movie, SampleTable, TrackInfo};
use crate::format::Codec;
use crate::Result;
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64(data: &[u8], pos: usize) -> Option<u64> {
    data.get(pos..pos + 8).map(|b| {
        u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new MP4 reader.
    pub fn new(mut reader: R) -> Self {
        let file_size = reader.seek(SeekFrom::End(0)).unwrap_or(0);
        let _ = reader.seek(SeekFrom::Start(0));
        Self { reader, file_size }
    }

    /// Parse the MP4 file into a movie with all tracks resolved.
    pub fn parse(&mut self) -> Result<Movie> {
        let mut movie = Movie {
            duration: 0,
            timescale: 1000,
            tracks: Vec::new(),
        };

        let mut saw_moov = false;
        let atoms = self.read_atoms(0, self.file_size)?;
        for atom in &atoms {
            if atom.atom_type == AtomType::MOOV {
                saw_moov = true;
                self.parse_moov(atom, &mut movie)?;
            }
        }
        if !saw_moov {
            return Err(crate::Error::MissingAtom("moov"));
        }

        Ok(movie)
    }

    /// Read the atoms between two file offsets.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos < end {
            self.reader.seek(SeekFrom::Start(pos))?;

            let mut header = [0u8; 8];
            if self.reader.read_exact(&mut header).is_err() {
                break;
            }

            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let atom_type = AtomType::from_bytes([header[4], header[5], header[6], header[7]]);

            let (actual_size, header_size) = if size == 1 {
                // 64-bit extended size
                let mut ext = [0u8; 8];
                self.reader.read_exact(&mut ext)?;
                (u64::from_be_bytes(ext), 16u8)
            } else if size == 0 {
                // Atom extends to end of file
                (end - pos, 8u8)
            } else {
                (size, 8u8)
            };

            if actual_size < header_size as u64 {
                break;
            }

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos += actual_size;
        }

        Ok(atoms)
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(crate::Error::InvalidMp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    fn children(&mut self, atom: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(atom.data_offset, atom.data_offset + atom.data_size())
    }

    /// Parse moov: movie header plus every trak, in file order.
    fn parse_moov(&mut self, moov: &Atom, movie: &mut Movie) -> Result<()> {
        for child in &self.children(moov)? {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(child, movie)?,
                AtomType::TRAK => {
                    let track = self.parse_trak(child)?;
                    movie.tracks.push(track);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, movie: &mut Movie) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let Some(&version) = data.first() else {
            return Ok(());
        };

        // Version 1 uses 64-bit creation/modification times and duration.
        if version == 0 {
            if let (Some(ts), Some(d)) = (be_u32(&data, 12), be_u32(&data, 16)) {
                movie.timescale = ts;
                movie.duration = d as u64;
            }
        } else if let (Some(ts), Some(d)) = (be_u32(&data, 20), be_u64(&data, 24)) {
            movie.timescale = ts;
            movie.duration = d;
        }

        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackInfo> {
        let mut track = TrackInfo::new(0);

        for child in &self.children(trak)? {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(child, &mut track)?,
                AtomType::MDIA => self.parse_mdia(child, &mut track)?,
                _ => {}
            }
        }

        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let Some(&version) = data.first() else {
            return Ok(());
        };

        // Width and height are 16.16 fixed point at the end of the box.
        let (id_at, dim_at) = if version == 0 { (12, 76) } else { (20, 88) };
        if let Some(id) = be_u32(&data, id_at) {
            track.track_id = id;
        }
        if let (Some(w), Some(h)) = (be_u32(&data, dim_at), be_u32(&data, dim_at + 4)) {
            track.width = Some(w >> 16);
            track.height = Some(h >> 16);
        }

        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackInfo) -> Result<()> {
        for child in &self.children(mdia)? {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::HDLR => self.parse_hdlr(child, track)?,
                AtomType::MINF => self.parse_minf(child, track)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let Some(&version) = data.first() else {
            return Ok(());
        };

        if version == 0 {
            if let (Some(ts), Some(d)) = (be_u32(&data, 12), be_u32(&data, 16)) {
                track.timescale = ts;
                track.duration = d as u64;
            }
        } else {
            if let Some(ts) = be_u32(&data, 20) {
                track.timescale = ts;
            }
            if let Some(d) = be_u64(&data, 24) {
                track.duration = d;
            }
        }

        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        if let Some(bytes) = data.get(8..12) {
            track.handler_type = HandlerType::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Ok(())
    }

    /// Parse minf (media info) atom.
    fn parse_minf(&mut self, minf: &Atom, track: &mut TrackInfo) -> Result<()> {
        for child in &self.children(minf)? {
            if child.atom_type == AtomType::STBL {
                self.parse_stbl(child, track)?;
            }
        }
        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackInfo) -> Result<()> {
        let mut builder = SampleTable::builder();

        for child in &self.children(stbl)? {
            let data = match child.atom_type {
                AtomType::STTS
                | AtomType::STSS
                | AtomType::STSC
                | AtomType::STSZ
                | AtomType::STCO
                | AtomType::CO64
                | AtomType::CTTS
                | AtomType::STSD => self.read_atom_data(child)?,
                _ => continue,
            };

            match child.atom_type {
                AtomType::STTS => {
                    builder.set_stts(parse_table(&data, 8, |d, p| {
                        Some((be_u32(d, p)?, be_u32(d, p + 4)?))
                    }));
                }
                AtomType::STSS => {
                    builder.set_sync_samples(parse_table(&data, 4, |d, p| be_u32(d, p)));
                }
                AtomType::STSC => {
                    builder.set_stsc(parse_table(&data, 12, |d, p| {
                        Some((be_u32(d, p)?, be_u32(d, p + 4)?, be_u32(d, p + 8)?))
                    }));
                }
                AtomType::STSZ => {
                    let uniform = be_u32(&data, 4).unwrap_or(0);
                    let count = be_u32(&data, 8).unwrap_or(0) as usize;
                    let sizes = if uniform == 0 {
                        let mut sizes = Vec::with_capacity(count);
                        for i in 0..count {
                            let Some(size) = be_u32(&data, 12 + i * 4) else {
                                break;
                            };
                            sizes.push(size);
                        }
                        sizes
                    } else {
                        vec![]
                    };
                    builder.set_stsz(uniform, sizes);
                }
                AtomType::STCO => {
                    builder.set_chunk_offsets(parse_table(&data, 4, |d, p| {
                        be_u32(d, p).map(u64::from)
                    }));
                }
                AtomType::CO64 => {
                    builder.set_chunk_offsets(parse_table(&data, 8, |d, p| be_u64(d, p)));
                }
                AtomType::CTTS => {
                    // Version 0 stores the offset unsigned, version 1
                    // signed; reinterpreting the bits covers both.
                    builder.set_ctts(parse_table(&data, 8, |d, p| {
                        Some((be_u32(d, p)?, be_u32(d, p + 4)? as i32))
                    }));
                }
                AtomType::STSD => self.parse_stsd(&data, track),
                _ => {}
            }
        }

        track.sample_table = builder.build();
        Ok(())
    }

    /// Parse stsd (sample description): codec identity and configuration.
    ///
    /// Only the first sample entry is examined; multi-entry stsd tracks
    /// are rare and end up unsupported at format time.
    fn parse_stsd(&mut self, data: &[u8], track: &mut TrackInfo) {
        let Some(entry_fourcc) = data.get(12..16) else {
            return;
        };
        let fourcc = [
            entry_fourcc[0],
            entry_fourcc[1],
            entry_fourcc[2],
            entry_fourcc[3],
        ];
        track.codec = Codec::from_fourcc(fourcc);

        match track.codec {
            Some(Codec::Aac) => {
                // AudioSampleEntry fixed fields relative to the stsd
                // payload: channels at 32, 16.16 sample rate at 40,
                // child boxes from 44.
                if let Some(channels) = be_u16(data, 32) {
                    track.channels = Some(channels);
                }
                if let Some(rate) = be_u32(data, 40) {
                    track.sample_rate = Some(rate >> 16);
                }
                track.codec_data = find_config_box(data, 44, b"esds");
            }
            Some(Codec::H264) | Some(Codec::H265) => {
                // VisualSampleEntry fixed fields end 86 bytes into the
                // entry; child boxes (avcC/hvcC) start at 94.
                track.codec_data =
                    find_config_box(data, 94, b"avcC").or_else(|| find_config_box(data, 94, b"hvcC"));
            }
            None => {}
        }
    }
}

/// Parse a counted full-box table: 4 bytes version/flags, 4 bytes entry
/// count, then `stride`-byte records decoded by `decode`.
fn parse_table<T>(data: &[u8], stride: usize, decode: impl Fn(&[u8], usize) -> Option<T>) -> Vec<T> {
    let count = be_u32(data, 4).unwrap_or(0) as usize;
    let mut entries = Vec::with_capacity(count.min(1 << 20));
    for i in 0..count {
        let Some(entry) = decode(data, 8 + i * stride) else {
            break;
        };
        entries.push(entry);
    }
    entries
}

/// Scan sibling boxes starting at `pos` for `fourcc`, returning its
/// payload (box header excluded) verbatim.
fn find_config_box(data: &[u8], mut pos: usize, fourcc: &[u8; 4]) -> Option<Vec<u8>> {
    while pos + 8 <= data.len() {
        let size = be_u32(data, pos)? as usize;
        if size < 8 || pos + size > data.len() {
            return None;
        }
        if &data[pos + 4..pos + 8] == fourcc {
            return Some(data[pos + 8..pos + size].to_vec());
        }
        pos += size;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be_helpers() {
        let data = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        assert_eq!(be_u16(&data, 0), Some(1));
        assert_eq!(be_u32(&data, 0), Some(0x00010203));
        assert_eq!(be_u64(&data, 0), Some(0x0001020304050607));
        assert_eq!(be_u32(&data, 6), None);
    }

    #[test]
    fn test_find_config_box() {
        // Two sibling boxes: "skip" then "avcC" with payload [1, 2, 3].
        let mut data = vec![0u8; 0];
        data.extend_from_slice(&12u32.to_be_bytes());
        data.extend_from_slice(b"skip");
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&11u32.to_be_bytes());
        data.extend_from_slice(b"avcC");
        data.extend_from_slice(&[1, 2, 3]);

        assert_eq!(find_config_box(&data, 0, b"avcC"), Some(vec![1, 2, 3]));
        assert_eq!(find_config_box(&data, 0, b"esds"), None);
    }

    #[test]
    fn test_parse_missing_moov() {
        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(b"isomisom");

        let mut reader = Mp4Reader::new(std::io::Cursor::new(data));
        assert!(matches!(
            reader.parse(),
            Err(crate::Error::MissingAtom("moov"))
        ));
    }
}
