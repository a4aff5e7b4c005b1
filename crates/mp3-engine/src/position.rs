//! Position and gain arithmetic.
//!
//! Pure helpers: seek offsets in the PCM buffer, elapsed time from device frame counters, and
//! left/right gain words from normalized volume and balance controls.

use serde::Serialize;

use crate::format::PcmFormat;

/// Full-scale gain word.
pub const UNITY_GAIN: u16 = 0xFFFF;

/// Per-channel output gain as 16-bit words (`0xFFFF` = unity).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StereoGain {
    pub left: u16,
    pub right: u16,
}

impl StereoGain {
    pub const UNITY: Self = Self {
        left: UNITY_GAIN,
        right: UNITY_GAIN,
    };

    /// Gains for `master` in `[0, 1]` and `balance` in `[-1, 1]` (negative = towards left).
    ///
    /// Out-of-range and NaN inputs are clamped (NaN counts as 0). A negative balance
    /// attenuates the right channel by `1 + balance`, a positive one the left channel by
    /// `1 - balance`.
    pub fn from_controls(master: f32, balance: f32) -> Self {
        let master = clamp_or_zero(master, 0.0, 1.0);
        let balance = clamp_or_zero(balance, -1.0, 1.0);

        let mut left = master;
        let mut right = master;
        if balance < 0.0 {
            right *= 1.0 + balance;
        } else if balance > 0.0 {
            left *= 1.0 - balance;
        }

        Self {
            left: (left * f32::from(UNITY_GAIN)) as u16,
            right: (right * f32::from(UNITY_GAIN)) as u16,
        }
    }

    /// Both words packed as `(right << 16) | left`.
    pub fn packed(&self) -> u32 {
        (u32::from(self.right) << 16) | u32::from(self.left)
    }

    pub fn from_packed(word: u32) -> Self {
        Self {
            left: (word & 0xFFFF) as u16,
            right: (word >> 16) as u16,
        }
    }

    pub fn left_scale(&self) -> f32 {
        f32::from(self.left) / f32::from(UNITY_GAIN)
    }

    pub fn right_scale(&self) -> f32 {
        f32::from(self.right) / f32::from(UNITY_GAIN)
    }
}

impl Default for StereoGain {
    fn default() -> Self {
        Self::UNITY
    }
}

fn clamp_or_zero(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}

/// Byte offset in a PCM buffer of `buffer_len` bytes where playback from `start_secs` begins.
///
/// The request is clamped to `[0, duration_secs]` and aligned down to a whole frame. When fewer
/// than one frame would remain, the offset backs off to the last full frame. Returns `None` when
/// the buffer does not hold a single frame.
pub fn start_byte_for(
    start_secs: f64,
    duration_secs: f64,
    buffer_len: usize,
    format: &PcmFormat,
) -> Option<usize> {
    let align = format.block_align();
    if align == 0 || buffer_len < align {
        return None;
    }
    let secs = if start_secs.is_nan() {
        0.0
    } else {
        start_secs.clamp(0.0, duration_secs.max(0.0))
    };
    let raw = (secs * format.bytes_per_second() as f64) as usize;
    let mut start = raw - raw % align;
    if start + align > buffer_len {
        let last = buffer_len - align;
        start = last - last % align;
    }
    Some(start)
}

/// Seconds represented by `byte_offset` bytes of PCM.
pub fn seconds_at_byte(byte_offset: usize, format: &PcmFormat) -> f64 {
    let bps = format.bytes_per_second();
    if bps == 0 {
        return 0.0;
    }
    byte_offset as f64 / bps as f64
}

/// Absolute position from a device frame counter and the offset playback started at.
pub fn position_secs(
    elapsed_frames: u64,
    sample_rate: u32,
    start_offset_secs: f64,
    duration_secs: f64,
) -> f64 {
    let played = if sample_rate == 0 {
        0.0
    } else {
        elapsed_frames as f64 / f64::from(sample_rate)
    };
    (start_offset_secs + played).min(duration_secs)
}
