//! MPEG audio Layer III frame headers.
//!
//! Just enough of the bitstream layout to find frame boundaries in a raw byte stream:
//! sync search, header decoding, frame length, ID3v2 tag skipping and VBR info frames.

/// Bytes in a frame header.
pub const HEADER_LEN: usize = 4;

/// Bytes in an ID3v2 tag header (and footer).
const ID3V2_HEADER_LEN: usize = 10;

const BITRATES_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Decoded Layer III frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channels: u16,
    pub crc_protected: bool,
}

impl FrameHeader {
    /// Decode a Layer III header from the first four bytes of `bytes`.
    ///
    /// Returns `None` for anything that is not a valid Layer III header, including free-format
    /// and reserved bitrate/sample-rate indices.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let b = bytes.get(..HEADER_LEN)?;
        if b[0] != 0xFF || b[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = match (b[1] >> 3) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };
        // Layer bits 01 = Layer III.
        if (b[1] >> 1) & 0b11 != 0b01 {
            return None;
        }
        let crc_protected = b[1] & 0x01 == 0;

        let bitrate_index = (b[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 0x0F {
            return None;
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => BITRATES_V1_L3[bitrate_index],
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => BITRATES_V2_L3[bitrate_index],
        };

        let base_rate = match (b[2] >> 2) & 0b11 {
            0b00 => 44_100,
            0b01 => 48_000,
            0b10 => 32_000,
            _ => return None,
        };
        let sample_rate = match version {
            MpegVersion::Mpeg1 => base_rate,
            MpegVersion::Mpeg2 => base_rate / 2,
            MpegVersion::Mpeg25 => base_rate / 4,
        };

        let padding = (b[2] >> 1) & 0x01 == 1;
        let channels = if (b[3] >> 6) == 0b11 { 1 } else { 2 };

        Some(Self {
            version,
            bitrate_kbps,
            sample_rate,
            padding,
            channels,
            crc_protected,
        })
    }

    pub fn bitrate_bps(&self) -> u32 {
        self.bitrate_kbps * 1000
    }

    pub fn samples_per_frame(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 576,
        }
    }

    /// Total frame length in bytes, header included.
    pub fn frame_len(&self) -> usize {
        let coefficient = match self.version {
            MpegVersion::Mpeg1 => 144,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 72,
        };
        let len = coefficient * self.bitrate_bps() as usize / self.sample_rate as usize;
        len + usize::from(self.padding)
    }

    /// Whether `other` can follow this header in the same stream.
    pub fn is_compatible(&self, other: &FrameHeader) -> bool {
        self.version == other.version
            && self.sample_rate == other.sample_rate
            && self.channels == other.channels
    }

    fn side_info_len(&self) -> usize {
        match (self.version, self.channels) {
            (MpegVersion::Mpeg1, 1) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, 1) => 9,
            (_, _) => 17,
        }
    }
}

/// Offset of the first candidate sync word (`0xFFE` prefix) in `bytes`.
pub fn find_sync(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(2)
        .position(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0)
}

/// Total size of an ID3v2 tag starting at `bytes[0]`, or `None` if there is no tag header.
pub fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    let header = bytes.get(..ID3V2_HEADER_LEN)?;
    if &header[..3] != b"ID3" {
        return None;
    }
    let size = header[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7F));
    let footer = if header[5] & 0x10 != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };
    Some(ID3V2_HEADER_LEN + size + footer)
}

/// Whether a complete frame carries a Xing/Info/VBRI header instead of audio.
pub fn is_vbr_info_frame(header: &FrameHeader, frame: &[u8]) -> bool {
    let xing_at = HEADER_LEN
        + if header.crc_protected { 2 } else { 0 }
        + header.side_info_len();
    let tag_at = |offset: usize| frame.get(offset..offset + 4);
    matches!(tag_at(xing_at), Some(b"Xing") | Some(b"Info"))
        || matches!(tag_at(HEADER_LEN + 32), Some(b"VBRI"))
}

/// First valid frame header in a raw MP3 byte stream, skipping a leading ID3v2 tag.
pub fn first_frame_header(bytes: &[u8]) -> Option<FrameHeader> {
    let mut pos = id3v2_len(bytes).unwrap_or(0);
    while pos < bytes.len() {
        let offset = find_sync(&bytes[pos..])?;
        pos += offset;
        if let Some(header) = FrameHeader::parse(&bytes[pos..]) {
            return Some(header);
        }
        pos += 1;
    }
    None
}
