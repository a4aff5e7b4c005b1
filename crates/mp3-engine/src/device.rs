//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config as close as possible to the track's sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

/// Largest fixed callback buffer requested from a device.
const MAX_BUFFER_FRAMES: u32 = 16_384;

/// Pick a CPAL output device.
///
/// - If `needle` is `Some`, chooses the first output device whose name contains the substring
///   (case-insensitive).
/// - Otherwise, returns the host default output device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the best output config for `target_rate`.
///
/// An exact rate match wins; otherwise the highest supported rate at or below the target, then
/// the lowest rate above it. Ties are broken by sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            below: rate <= target_rate,
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        let replace = best
            .as_ref()
            .is_none_or(|(current, _)| candidate.is_better_than(current));
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_buffer_frames(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn clamp_buffer_frames(min: u32, max: u32) -> u32 {
    if max > MAX_BUFFER_FRAMES {
        min.max(MAX_BUFFER_FRAMES)
    } else {
        max
    }
}

/// Output device summary for `--list-devices`.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub is_default: bool,
}

/// Enumerate output devices on the default host.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.to_string());

    let mut out = Vec::new();
    for d in host.output_devices().context("No output devices")? {
        let name = d.description()?.to_string();
        let (min_rate, max_rate) = match d.supported_output_configs() {
            Ok(ranges) => ranges.fold((u32::MAX, 0u32), |(lo, hi), r| {
                (lo.min(r.min_sample_rate()), hi.max(r.max_sample_rate()))
            }),
            Err(e) => {
                tracing::debug!(device = %name, "supported configs unavailable: {e}");
                (u32::MAX, 0)
            }
        };
        if max_rate == 0 {
            tracing::warn!(device = %name, "skipping device without output configs");
            continue;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate) -> bool {
        if self.below != other.below {
            self.below
        } else if self.rate != other.rate {
            self.rate > other.rate
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
