//! Coarse amplitude preview of the decoded buffer.

use crate::format::PcmFormat;

/// Sample `points` evenly spaced frames of a 16-bit PCM buffer.
///
/// Each value is the mean of the frame's first two channels scaled to `[-1, 1)`. The stride is
/// `max(1, frames / points)`, so short buffers yield fewer than `points` values. Anything that is
/// not 16-bit PCM yields an empty preview.
pub fn preview(pcm: &[u8], format: &PcmFormat, points: usize) -> Vec<f32> {
    let align = format.block_align();
    if points == 0 || format.bits_per_sample != 16 || align == 0 {
        return Vec::new();
    }
    let frames = pcm.len() / align;
    if frames == 0 {
        return Vec::new();
    }
    let step = (frames / points).max(1);

    (0..points)
        .map(|i| i * step)
        .take_while(|&frame| frame < frames)
        .map(|frame| frame_mean(&pcm[frame * align..(frame + 1) * align]))
        .collect()
}

fn frame_mean(frame: &[u8]) -> f32 {
    let sample = |i: usize| {
        frame
            .get(i * 2..i * 2 + 2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])))
    };
    let Some(left) = sample(0) else {
        return 0.0;
    };
    // mono duplicates the single channel
    let right = sample(1).unwrap_or(left);
    (left + right) / 2.0 / 32_768.0
}
