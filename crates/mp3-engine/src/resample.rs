//! Streaming resample stage.
//!
//! Used only when the output device cannot run at the track's sample rate. Converts
//! interleaved `f32` audio with Rubato's async sinc resampler on a background thread and writes
//! into a bounded [`SharedAudio`] queue consumed by the output callback.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{PopStrategy, SharedAudio, calc_max_buffered_samples};

/// Configuration for the streaming resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames.
    pub chunk_frames: usize,
    /// Target buffering (seconds) of the output queue.
    pub buffer_seconds: f32,
}

/// One resampler plus its scratch output buffer.
struct Stage {
    resampler: Async<f32>,
    channels: usize,
    out: Vec<f32>,
    indexing: Indexing,
}

impl Stage {
    fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let ratio = f64::from(dst_rate) / f64::from(src_rate);

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let resampler = Async::<f32>::new_sinc(
            ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;

        let out_frames = (chunk_frames as f64 * ratio * 1.1).ceil() as usize + 256;
        Ok(Self {
            resampler,
            channels,
            out: vec![0.0; out_frames * channels],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Resample one chunk; `partial` marks a short final chunk.
    fn process(&mut self, input: &[f32], partial: Option<usize>) -> Result<&[f32]> {
        let frames_in = input.len() / self.channels;
        let input_adapter = InterleavedSlice::new(input, self.channels, frames_in)
            .map_err(|e| anyhow!("interleaved input: {e}"))?;
        let out_capacity = self.out.len() / self.channels;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.out, self.channels, out_capacity)
            .map_err(|e| anyhow!("interleaved output: {e}"))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = partial;

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&self.indexing))
            .map_err(|e| anyhow!("resample: {e}"))?;
        Ok(&self.out[..nbr_out * self.channels])
    }
}

/// Start a resampler thread reading `srcq` at `src_rate` and producing `dst_rate` audio.
///
/// The returned queue is closed once `srcq` is closed and drained, or on a resampler error.
pub fn start_resampler(
    srcq: Arc<SharedAudio>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<(Arc<SharedAudio>, JoinHandle<()>)> {
    let channels = srcq.channels();
    let chunk_frames = cfg.chunk_frames.max(1);
    let mut stage = Stage::new(src_rate, dst_rate, channels, chunk_frames)?;

    let dstq = Arc::new(SharedAudio::new(
        channels,
        calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds),
    ));
    let dstq_thread = dstq.clone();

    let handle = thread::Builder::new()
        .name("mp3-resample".into())
        .spawn(move || {
            if let Err(e) = run(&mut stage, &srcq, &dstq_thread, chunk_frames) {
                tracing::error!("resampler stopped: {e:#}");
                srcq.close();
            }
            dstq_thread.close();
        })?;

    tracing::info!(src_rate, dst_rate, chunk_frames, "resampling");
    Ok((dstq, handle))
}

fn run(
    stage: &mut Stage,
    srcq: &SharedAudio,
    dstq: &SharedAudio,
    chunk_frames: usize,
) -> Result<()> {
    while let Some(chunk) = srcq.pop(PopStrategy::BlockingExact {
        frames: chunk_frames,
    }) {
        dstq.push_interleaved_blocking(stage.process(&chunk, None)?);
        if dstq.is_done() {
            return Ok(());
        }
    }

    while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo {
        max_frames: chunk_frames,
    }) {
        let tail_frames = tail.len() / stage.channels;
        let mut padded = tail;
        padded.resize(chunk_frames * stage.channels, 0.0);
        let produced = stage.process(&padded, Some(tail_frames))?;
        if !produced.is_empty() {
            dstq.push_interleaved_blocking(produced);
        }
    }
    Ok(())
}
