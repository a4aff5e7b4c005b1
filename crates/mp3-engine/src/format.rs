//! Fixed input/output formats the engine understands.
//!
//! The engine accepts exactly one compressed profile (MPEG Layer III, 44.1 kHz, stereo) and
//! always produces interleaved signed 16-bit little-endian PCM at the same rate and channel
//! count.

use std::fmt;

use serde::Serialize;

/// Size in bytes of one compressed read unit fed to the codec session.
pub const MP3_BLOCK_SIZE: usize = 522;

/// Container durations are reported in 100 ns ticks.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Linear PCM layout of the decoded track buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 44.1 kHz, 2 channels, 16-bit.
    pub const CD_STEREO: Self = Self {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
    };

    pub const fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes per frame (all channels of one sample instant).
    pub const fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub const fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::CD_STEREO
    }
}

/// Codec identifier reported by a container for its primary stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecTag {
    Mp3,
    Flac,
    Aac,
    Alac,
    Vorbis,
    Opus,
    Pcm,
    Unknown,
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecTag::Mp3 => "MP3",
            CodecTag::Flac => "FLAC",
            CodecTag::Aac => "AAC",
            CodecTag::Alac => "ALAC",
            CodecTag::Vorbis => "VORBIS",
            CodecTag::Opus => "OPUS",
            CodecTag::Pcm => "PCM",
            CodecTag::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Compressed stream profile the engine is willing to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputProfile {
    pub codec: CodecTag,
    pub sample_rate: u32,
    pub channels: u16,
}

impl InputProfile {
    pub const MP3_STEREO_44K: Self = Self {
        codec: CodecTag::Mp3,
        sample_rate: 44_100,
        channels: 2,
    };

    /// PCM layout produced when transcoding this profile.
    pub const fn output_format(&self) -> PcmFormat {
        PcmFormat {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
        }
    }
}

impl Default for InputProfile {
    fn default() -> Self {
        Self::MP3_STEREO_44K
    }
}
