//! DSK and Extended DSK disk image parsing, limited to sector extraction.
//!
//! Standard images (`MV - CPCEMU`) use one fixed track size; extended
//! images (`EXTENDED`) carry a per-track size table. Either way each
//! formatted track starts with a `Track-Info` block listing its sector
//! ID fields, followed by the sector data in listed order.

use std::fmt;

const STANDARD_HEADER: &[u8] = b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n";
const EXTENDED_HEADER: &[u8] = b"EXTENDED CPC DSK File\r\nDisk-Info\r\n";
const TRACK_SIGNATURE: &[u8] = b"Track-Info\r\n";

/// Disc-information and track-information blocks are both 256 bytes.
const BLOCK_SIZE: usize = 0x100;

#[derive(Debug)]
pub enum DskError {
    /// Shorter than the disc-information block.
    TooShort(usize),
    /// Neither the standard nor the extended signature.
    BadHeader,
    /// A track offset ran past the end of the image.
    TruncatedTrack(usize),
    /// Track block without the `Track-Info` signature.
    BadTrackSignature(usize),
}

impl fmt::Display for DskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => {
                write!(f, "DSK image is {len} bytes, shorter than the header")
            }
            Self::BadHeader => write!(f, "not a DSK image (unrecognised header)"),
            Self::TruncatedTrack(index) => {
                write!(f, "track {index} extends past the end of the image")
            }
            Self::BadTrackSignature(index) => {
                write!(f, "track {index} lacks a Track-Info block")
            }
        }
    }
}

impl std::error::Error for DskError {}

/// One sector: the four ID bytes from the address mark plus its data.
pub struct Sector {
    pub c: u8,
    pub h: u8,
    pub r: u8,
    pub n: u8,
    pub data: Vec<u8>,
}

impl Sector {
    /// Nominal data length encoded by N.
    #[must_use]
    pub fn nominal_len(&self) -> usize {
        0x80 << self.n
    }
}

/// One formatted track.
pub struct Track {
    pub cylinder: u8,
    pub side: u8,
    pub sectors: Vec<Sector>,
}

/// A parsed disk image, reduced to its sectors.
pub struct DskImage {
    tracks: Vec<Track>,
    sides: u8,
}

impl DskImage {
    /// Parse a standard or extended DSK image.
    ///
    /// # Errors
    ///
    /// Fails on a malformed header or truncated track data.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DskError> {
        if data.len() < BLOCK_SIZE {
            return Err(DskError::TooShort(data.len()));
        }
        let extended = if data.starts_with(EXTENDED_HEADER) {
            true
        } else if data.starts_with(STANDARD_HEADER) {
            false
        } else {
            return Err(DskError::BadHeader);
        };

        let track_count = data[0x30] as usize;
        let sides = data[0x31];
        let total = track_count * sides.max(1) as usize;

        let mut tracks = Vec::with_capacity(total);
        let mut offset = BLOCK_SIZE;
        for index in 0..total {
            let size = if extended {
                // Per-track size table at 0x34, in 256-byte units.
                // Zero marks an unformatted track with no block at all.
                data.get(0x34 + index).copied().unwrap_or(0) as usize * 0x100
            } else {
                u16::from_le_bytes([data[0x32], data[0x33]]) as usize
            };
            if size == 0 {
                continue;
            }
            if offset + BLOCK_SIZE > data.len() {
                return Err(DskError::TruncatedTrack(index));
            }
            tracks.push(Self::parse_track(&data[offset..], index, extended)?);
            offset += size;
        }

        Ok(Self { tracks, sides })
    }

    fn parse_track(block: &[u8], index: usize, extended: bool) -> Result<Track, DskError> {
        if !block.starts_with(TRACK_SIGNATURE) {
            return Err(DskError::BadTrackSignature(index));
        }
        let cylinder = block[0x10];
        let side = block[0x11];
        let default_size = 0x80usize << block[0x14];
        let sector_count = block[0x15] as usize;

        let mut sectors = Vec::with_capacity(sector_count);
        let mut data_offset = BLOCK_SIZE;
        for s in 0..sector_count {
            // Sector info list: 8 bytes per sector from 0x18.
            let info = 0x18 + s * 8;
            if info + 8 > block.len() {
                return Err(DskError::TruncatedTrack(index));
            }
            let n = block[info + 3];
            let size = if extended {
                // Extended images record the actual stored length, which
                // copy-protected sectors need.
                u16::from_le_bytes([block[info + 6], block[info + 7]]) as usize
            } else {
                0x80 << n.min(7)
            };
            let size = if size == 0 { default_size } else { size };
            if data_offset + size > block.len() {
                return Err(DskError::TruncatedTrack(index));
            }
            sectors.push(Sector {
                c: block[info],
                h: block[info + 1],
                r: block[info + 2],
                n,
                data: block[data_offset..data_offset + size].to_vec(),
            });
            data_offset += size;
        }

        Ok(Track {
            cylinder,
            side,
            sectors,
        })
    }

    #[must_use]
    pub fn sides(&self) -> u8 {
        self.sides
    }

    /// Locate a formatted track by physical position.
    #[must_use]
    pub fn track(&self, cylinder: u8, side: u8) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| t.cylinder == cylinder && t.side == side)
    }

    #[must_use]
    pub fn track_mut(&mut self, cylinder: u8, side: u8) -> Option<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.cylinder == cylinder && t.side == side)
    }
}

impl Track {
    /// Find a sector by its R (sector ID) byte.
    #[must_use]
    pub fn sector(&self, r: u8) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.r == r)
    }

    #[must_use]
    pub fn sector_mut(&mut self, r: u8) -> Option<&mut Sector> {
        self.sectors.iter_mut().find(|s| s.r == r)
    }
}

/// Build a single-track test image in memory. Shared by the unit tests
/// here and in the controller.
#[doc(hidden)]
#[must_use]
pub fn test_image(sector_ids: &[u8], fill: u8) -> Vec<u8> {
    let sector_size = 512usize;
    let track_size = BLOCK_SIZE + sector_ids.len() * sector_size;

    let mut raw = vec![0u8; BLOCK_SIZE];
    raw[..STANDARD_HEADER.len()].copy_from_slice(STANDARD_HEADER);
    raw[0x30] = 1; // tracks
    raw[0x31] = 1; // sides
    raw[0x32..0x34].copy_from_slice(&(track_size as u16).to_le_bytes());

    let mut track = vec![0u8; BLOCK_SIZE];
    track[..TRACK_SIGNATURE.len()].copy_from_slice(TRACK_SIGNATURE);
    track[0x10] = 0; // cylinder
    track[0x11] = 0; // side
    track[0x14] = 2; // N=2: 512 bytes
    track[0x15] = sector_ids.len() as u8;
    for (i, &r) in sector_ids.iter().enumerate() {
        let info = 0x18 + i * 8;
        track[info] = 0; // C
        track[info + 1] = 0; // H
        track[info + 2] = r;
        track[info + 3] = 2; // N
    }
    raw.extend_from_slice(&track);

    for i in 0..sector_ids.len() {
        let mut sector = vec![fill; sector_size];
        sector[0] = 0xA0 | i as u8; // tag first byte per sector
        raw.extend_from_slice(&sector);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_image() {
        let raw = test_image(&[0xC1, 0xC2], 0xE5);
        let image = DskImage::from_bytes(&raw).expect("parses");
        assert_eq!(image.sides(), 1);
        let track = image.track(0, 0).expect("track 0");
        assert_eq!(track.sectors.len(), 2);
        let sector = track.sector(0xC2).expect("sector C2");
        assert_eq!(sector.n, 2);
        assert_eq!(sector.data.len(), 512);
        assert_eq!(sector.data[0], 0xA1);
        assert_eq!(sector.nominal_len(), 512);
    }

    #[test]
    fn rejects_unknown_header() {
        let raw = vec![0u8; 0x200];
        assert!(matches!(
            DskImage::from_bytes(&raw),
            Err(DskError::BadHeader)
        ));
    }

    #[test]
    fn rejects_short_image() {
        assert!(matches!(
            DskImage::from_bytes(&[0; 16]),
            Err(DskError::TooShort(16))
        ));
    }

    #[test]
    fn rejects_truncated_track_data() {
        let mut raw = test_image(&[0xC1], 0xE5);
        raw.truncate(raw.len() - 100);
        assert!(matches!(
            DskImage::from_bytes(&raw),
            Err(DskError::TruncatedTrack(0))
        ));
    }

    #[test]
    fn missing_sector_lookup_returns_none() {
        let raw = test_image(&[0xC1], 0xE5);
        let image = DskImage::from_bytes(&raw).expect("parses");
        assert!(image.track(0, 0).expect("track").sector(0x99).is_none());
        assert!(image.track(5, 0).is_none());
    }
}
