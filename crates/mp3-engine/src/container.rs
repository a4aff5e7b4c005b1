//! Container metadata stage.
//!
//! A [`ContainerService`] opens the compressed byte buffer; [`read_track_info`] validates the
//! primary stream against the fixed [`InputProfile`] and extracts duration and tags.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::format::{CodecTag, InputProfile, TICKS_PER_SECOND};

/// Kind of media carried by a container's primary stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Other,
}

/// Format of the primary stream as reported by the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub kind: MediaKind,
    pub codec: CodecTag,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Descriptive tags the engine asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKey {
    Title,
    /// Artist, stored by some containers as "Author".
    Artist,
    Album,
    /// Average bitrate in bits per second.
    Bitrate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagValue {
    Text(String),
    Number(u64),
}

/// Parsed container over an in-memory compressed buffer.
pub trait ContainerReader {
    /// Total duration in 100 ns ticks.
    fn duration_ticks(&self) -> Result<u64>;
    fn tag(&self, key: TagKey) -> Option<TagValue>;
    fn stream_format(&self) -> Result<StreamFormat>;
}

/// Opens compressed byte buffers as containers.
pub trait ContainerService {
    type Reader: ContainerReader;

    fn open(&self, bytes: Arc<Vec<u8>>) -> Result<Self::Reader>;
}

/// Best-effort descriptive metadata of the open track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Bits per second, 0 when unknown.
    pub bitrate: u32,
}

/// Validated container facts needed to transcode a track.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackInfo {
    pub duration_secs: f64,
    pub format: StreamFormat,
    pub metadata: TrackMetadata,
}

/// Validate the primary stream against `profile` and collect duration and tags.
///
/// Any profile mismatch is an error; there is no relaxed or converted fallback. Missing tags
/// are not errors.
pub fn read_track_info<R: ContainerReader>(reader: &R, profile: &InputProfile) -> Result<TrackInfo> {
    let format = reader.stream_format()?;
    if format.kind != MediaKind::Audio {
        return Err(anyhow!("primary stream is not audio"));
    }
    if format.codec != profile.codec {
        return Err(anyhow!(
            "codec {} does not match expected {}",
            format.codec,
            profile.codec
        ));
    }
    if format.sample_rate != profile.sample_rate {
        return Err(anyhow!(
            "sample rate {} Hz does not match expected {} Hz",
            format.sample_rate,
            profile.sample_rate
        ));
    }
    if format.channels != profile.channels {
        return Err(anyhow!(
            "{} channel(s) do not match expected {}",
            format.channels,
            profile.channels
        ));
    }

    let ticks = reader.duration_ticks()?;
    if ticks == 0 {
        return Err(anyhow!("container reports zero duration"));
    }
    let duration_secs = ticks as f64 / TICKS_PER_SECOND as f64;

    let metadata = TrackMetadata {
        title: text_tag(reader, TagKey::Title),
        artist: text_tag(reader, TagKey::Artist),
        album: text_tag(reader, TagKey::Album),
        bitrate: number_tag(reader, TagKey::Bitrate),
    };

    Ok(TrackInfo {
        duration_secs,
        format,
        metadata,
    })
}

fn text_tag<R: ContainerReader>(reader: &R, key: TagKey) -> String {
    match reader.tag(key) {
        Some(TagValue::Text(text)) => text.trim_end_matches('\0').to_string(),
        Some(TagValue::Number(n)) => n.to_string(),
        None => String::new(),
    }
}

fn number_tag<R: ContainerReader>(reader: &R, key: TagKey) -> u32 {
    match reader.tag(key) {
        Some(TagValue::Number(n)) => u32::try_from(n).unwrap_or(u32::MAX),
        Some(TagValue::Text(text)) => text.trim().parse().unwrap_or(0),
        None => 0,
    }
}
