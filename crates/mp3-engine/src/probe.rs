//! Symphonia-backed container reader.
//!
//! Probes the in-memory buffer once, captures the primary stream format, a duration (from the
//! container's frame count, or by walking packets when the container does not report one) and
//! the descriptive tags found in ID3 or container metadata.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::Hint;

use crate::container::{
    ContainerReader, ContainerService, MediaKind, StreamFormat, TagKey, TagValue,
};
use crate::format::{CodecTag, TICKS_PER_SECOND};
use crate::frame;

/// Opens MP3 byte buffers through Symphonia's probe.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaContainer;

/// Shared input buffer readable through a `Cursor` without copying it.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Facts captured from one probed buffer.
#[derive(Debug)]
pub struct SymphoniaReader {
    format: Option<StreamFormat>,
    duration_ticks: Option<u64>,
    tags: HashMap<TagKey, TagValue>,
}

impl ContainerService for SymphoniaContainer {
    type Reader = SymphoniaReader;

    fn open(&self, bytes: Arc<Vec<u8>>) -> Result<SymphoniaReader> {
        let first_header = frame::first_frame_header(&bytes);
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(SharedBytes(bytes))),
            Default::default(),
        );

        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("probe container")?;

        let mut tags = HashMap::new();
        if let Some(mut probe_meta) = probed.metadata.get() {
            if let Some(rev) = probe_meta.skip_to_latest() {
                collect_tags(rev, &mut tags);
            }
        }
        if let Some(rev) = probed.format.metadata().skip_to_latest() {
            collect_tags(rev, &mut tags);
        }
        if let Some(header) = first_header {
            tags.entry(TagKey::Bitrate)
                .or_insert(TagValue::Number(u64::from(header.bitrate_bps())));
        }

        let mut format = probed.format;
        let Some(track) = format.default_track() else {
            return Ok(SymphoniaReader {
                format: None,
                duration_ticks: None,
                tags,
            });
        };
        let params = track.codec_params.clone();
        let stream_format = stream_format_from_params(&params);

        let duration_ticks = match (params.n_frames, params.sample_rate) {
            (Some(frames), Some(rate)) => ticks_from_frames(frames, rate),
            (None, Some(rate)) => {
                let frames = count_packet_frames(format.as_mut());
                tracing::debug!(frames, "duration estimated from packets");
                ticks_from_frames(frames, rate)
            }
            _ => None,
        };

        tracing::debug!(
            codec = %stream_format.codec,
            rate_hz = stream_format.sample_rate,
            channels = stream_format.channels,
            duration_ticks = ?duration_ticks,
            tags = tags.len(),
            "container probed"
        );

        Ok(SymphoniaReader {
            format: Some(stream_format),
            duration_ticks,
            tags,
        })
    }
}

impl ContainerReader for SymphoniaReader {
    fn duration_ticks(&self) -> Result<u64> {
        self.duration_ticks
            .ok_or_else(|| anyhow!("container does not report a duration"))
    }

    fn tag(&self, key: TagKey) -> Option<TagValue> {
        self.tags.get(&key).cloned()
    }

    fn stream_format(&self) -> Result<StreamFormat> {
        self.format.ok_or_else(|| anyhow!("container has no default track"))
    }
}

fn stream_format_from_params(params: &CodecParameters) -> StreamFormat {
    let sample_rate = params.sample_rate.unwrap_or(0);
    let kind = if sample_rate > 0 {
        MediaKind::Audio
    } else {
        MediaKind::Other
    };
    StreamFormat {
        kind,
        codec: codec_tag_from_params(params),
        sample_rate,
        channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
    }
}

fn codec_tag_from_params(params: &CodecParameters) -> CodecTag {
    use symphonia::core::codecs::*;
    match params.codec {
        CODEC_TYPE_MP3 => CodecTag::Mp3,
        CODEC_TYPE_FLAC => CodecTag::Flac,
        CODEC_TYPE_AAC => CodecTag::Aac,
        CODEC_TYPE_ALAC => CodecTag::Alac,
        CODEC_TYPE_VORBIS => CodecTag::Vorbis,
        CODEC_TYPE_OPUS => CodecTag::Opus,
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE | CODEC_TYPE_PCM_S24LE
        | CODEC_TYPE_PCM_S24BE | CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE
        | CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => CodecTag::Pcm,
        _ => CodecTag::Unknown,
    }
}

fn ticks_from_frames(frames: u64, rate: u32) -> Option<u64> {
    if rate == 0 {
        return None;
    }
    let ticks = u128::from(frames) * u128::from(TICKS_PER_SECOND) / u128::from(rate);
    u64::try_from(ticks).ok()
}

/// Sum packet durations until the reader runs out of data.
fn count_packet_frames(format: &mut dyn FormatReader) -> u64 {
    let mut frames = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) => frames = frames.saturating_add(packet.dur),
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                tracing::debug!("packet walk stopped: {e}");
                break;
            }
        }
    }
    frames
}

fn collect_tags(rev: &MetadataRevision, out: &mut HashMap<TagKey, TagValue>) {
    for tag in rev.tags() {
        let key = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => TagKey::Title,
            Some(StandardTagKey::Artist) => TagKey::Artist,
            Some(StandardTagKey::Album) => TagKey::Album,
            _ if tag.key.eq_ignore_ascii_case("bitrate") => TagKey::Bitrate,
            _ => continue,
        };
        let value = match &tag.value {
            Value::String(s) => TagValue::Text(s.clone()),
            Value::UnsignedInt(n) => TagValue::Number(*n),
            Value::SignedInt(n) => match u64::try_from(*n) {
                Ok(n) => TagValue::Number(n),
                Err(_) => continue,
            },
            other => TagValue::Text(other.to_string()),
        };
        out.insert(key, value);
    }
}
