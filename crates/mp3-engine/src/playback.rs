//! CPAL output backend.
//!
//! [`CpalOutput`] opens the configured (or default) device at the closest supported rate and
//! hands out [`CpalDevice`]s. Each device plays one prepared [`PcmRegion`] through a CPAL
//! output stream. The callback:
//! - outputs silence and does not advance while stopped or paused
//! - applies the left/right gain words (read from an atomic, so volume changes are immediate)
//! - maps the stereo source onto the device channel layout
//! - converts `f32` samples to the device sample format
//!
//! When the device cannot run at the track rate, a feeder thread converts the region to `f32`
//! into a [`SharedAudio`] queue and a Rubato stage resamples it for the callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::EngineConfig;
use crate::device;
use crate::format::PcmFormat;
use crate::output::{OutputDevice, OutputService, PcmRegion};
use crate::position::StereoGain;
use crate::queue::{PopStrategy, SharedAudio, calc_max_buffered_samples};
use crate::resample::{self, ResampleConfig};

/// Output service backed by the default CPAL host.
pub struct CpalOutput {
    device_name: Option<String>,
    refill_max_frames: usize,
    resample: ResampleConfig,
    /// Packed gain inherited by devices opened later.
    default_gain: AtomicU32,
}

impl CpalOutput {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            device_name: config.output_device.clone(),
            refill_max_frames: config.refill_max_frames.max(1),
            resample: ResampleConfig {
                chunk_frames: config.chunk_frames,
                buffer_seconds: config.buffer_seconds,
            },
            default_gain: AtomicU32::new(StereoGain::UNITY.packed()),
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl OutputService for CpalOutput {
    type Device = CpalDevice;

    fn open(&self, format: &PcmFormat) -> Result<CpalDevice> {
        if format.bits_per_sample != 16 {
            return Err(anyhow!(
                "{}-bit PCM is not supported by the output stage",
                format.bits_per_sample
            ));
        }
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device_name.as_deref())?;
        let config = device::pick_output_config(&device, format.sample_rate)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }

        let name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "<unnamed>".to_string());
        tracing::info!(
            device = %name,
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output device opened"
        );

        Ok(CpalDevice {
            device,
            sample_format: config.sample_format(),
            stream_config,
            source: *format,
            shared: Arc::new(CallbackShared::new(self.default_gain.load(Ordering::Relaxed))),
            stream: None,
            stage: None,
            refill_max_frames: self.refill_max_frames,
            resample: self.resample,
        })
    }

    fn set_default_gain(&self, gain: StereoGain) -> Result<()> {
        self.default_gain.store(gain.packed(), Ordering::Relaxed);
        Ok(())
    }
}

/// State shared between a device handle and its callback.
struct CallbackShared {
    gain: AtomicU32,
    running: AtomicBool,
    paused: AtomicBool,
    /// Device-rate frames produced from the region.
    played_frames: AtomicU64,
    drained: AtomicBool,
}

impl CallbackShared {
    fn new(gain: u32) -> Self {
        Self {
            gain: AtomicU32::new(gain),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            played_frames: AtomicU64::new(0),
            drained: AtomicBool::new(false),
        }
    }
}

/// One open CPAL output device.
pub struct CpalDevice {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
    source: PcmFormat,
    shared: Arc<CallbackShared>,
    stream: Option<cpal::Stream>,
    stage: Option<ResampleStage>,
    refill_max_frames: usize,
    resample: ResampleConfig,
}

impl OutputDevice for CpalDevice {
    fn prepare(&mut self, region: PcmRegion) -> Result<()> {
        if self.stream.is_some() {
            return Err(anyhow!("a buffer is already prepared"));
        }
        let src_channels = usize::from(self.source.channels);
        let dst_rate = self.stream_config.sample_rate;

        let feed = if dst_rate == self.source.sample_rate {
            Feed::Direct { region, pos: 0 }
        } else {
            let stage = ResampleStage::start(region, &self.source, dst_rate, self.resample)?;
            let feed = Feed::Queued {
                queue: stage.output.clone(),
                buf: Vec::new(),
                pos: 0,
                refill_max_frames: self.refill_max_frames,
            };
            self.stage = Some(stage);
            feed
        };

        self.shared.played_frames.store(0, Ordering::Relaxed);
        self.shared.drained.store(false, Ordering::Relaxed);
        let stream = build_output_stream(
            &self.device,
            &self.stream_config,
            self.sample_format,
            feed,
            src_channels,
            self.shared.clone(),
        )
        .context("build output stream")?;
        self.stream = Some(stream);
        Ok(())
    }

    fn write(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| anyhow!("no buffer prepared"))?;
        self.shared.running.store(true, Ordering::Relaxed);
        stream.play().context("start output stream")?;
        Ok(())
    }

    fn unprepare(&mut self) -> Result<()> {
        self.stream = None;
        if let Some(stage) = self.stage.take() {
            stage.join();
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        if let Some(stage) = &self.stage {
            stage.stop();
        }
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                tracing::debug!("stream pause on reset failed: {e}");
            }
        }
        self.shared.played_frames.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.shared.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.shared.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn elapsed_frames(&self) -> Result<u64> {
        let played = self.shared.played_frames.load(Ordering::Relaxed);
        Ok(device_to_source_frames(
            played,
            self.stream_config.sample_rate,
            self.source.sample_rate,
        ))
    }

    fn set_gain(&mut self, gain: StereoGain) -> Result<()> {
        self.shared.gain.store(gain.packed(), Ordering::Relaxed);
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.shared.drained.load(Ordering::Relaxed)
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.stream = None;
        if let Some(stage) = self.stage.take() {
            stage.stop();
            stage.join();
        }
        tracing::debug!("output device closed");
    }
}

fn device_to_source_frames(frames: u64, device_rate: u32, source_rate: u32) -> u64 {
    if device_rate == source_rate || device_rate == 0 {
        return frames;
    }
    let scaled = u128::from(frames) * u128::from(source_rate) / u128::from(device_rate);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Feeder and resampler threads for a device running at a different rate.
struct ResampleStage {
    input: Arc<SharedAudio>,
    output: Arc<SharedAudio>,
    feeder: JoinHandle<()>,
    resampler: JoinHandle<()>,
}

impl ResampleStage {
    fn start(
        region: PcmRegion,
        source: &PcmFormat,
        dst_rate: u32,
        cfg: ResampleConfig,
    ) -> Result<Self> {
        let channels = usize::from(source.channels);
        let input = Arc::new(SharedAudio::new(
            channels,
            calc_max_buffered_samples(source.sample_rate, channels, cfg.buffer_seconds),
        ));
        let (output, resampler) =
            resample::start_resampler(input.clone(), source.sample_rate, dst_rate, cfg)?;

        let feeder_q = input.clone();
        let chunk_frames = cfg.chunk_frames.max(1);
        let feeder = match thread::Builder::new()
            .name("mp3-feed".into())
            .spawn(move || feed_region(&region, &feeder_q, chunk_frames))
        {
            Ok(handle) => handle,
            Err(err) => {
                shutdown_resampler(&input, &output, resampler);
                return Err(err).context("spawn feeder thread");
            }
        };

        Ok(Self {
            input,
            output,
            feeder,
            resampler,
        })
    }

    fn stop(&self) {
        self.input.close();
        self.output.close();
    }

    fn join(self) {
        self.stop();
        if self.feeder.join().is_err() {
            tracing::warn!("feeder thread panicked");
        }
        shutdown_resampler(&self.input, &self.output, self.resampler);
    }
}

/// Close both resampler queues and wait for its thread.
fn shutdown_resampler(input: &SharedAudio, output: &SharedAudio, resampler: JoinHandle<()>) {
    input.close();
    output.close();
    if resampler.join().is_err() {
        tracing::warn!("resampler thread panicked");
    }
}

/// Push the region into `queue` as `f32`, then close it.
fn feed_region(region: &PcmRegion, queue: &SharedAudio, chunk_frames: usize) {
    let chunk_bytes = chunk_frames * queue.channels() * 2;
    let mut samples = Vec::with_capacity(chunk_frames * queue.channels());
    for chunk in region.bytes().chunks(chunk_bytes) {
        if queue.is_done() {
            return;
        }
        samples.clear();
        samples.extend(chunk.chunks_exact(2).map(|b| pcm16_to_f32([b[0], b[1]])));
        queue.push_interleaved_blocking(&samples);
    }
    queue.close();
}

fn pcm16_to_f32(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_le_bytes(bytes)) / 32_768.0
}

/// Source of interleaved frames for the callback.
enum Feed {
    /// Reads straight from the region (device runs at the track rate).
    Direct { region: PcmRegion, pos: usize },
    /// Drains a resampled queue in bursts of up to `refill_max_frames`.
    Queued {
        queue: Arc<SharedAudio>,
        buf: Vec<f32>,
        pos: usize,
        refill_max_frames: usize,
    },
}

impl Feed {
    /// Fill `frame` with the next source frame; `false` when nothing is ready.
    fn next_frame(&mut self, frame: &mut [f32]) -> bool {
        match self {
            Feed::Direct { region, pos } => {
                let need = frame.len() * 2;
                let Some(bytes) = region.bytes().get(*pos..*pos + need) else {
                    return false;
                };
                for (sample, b) in frame.iter_mut().zip(bytes.chunks_exact(2)) {
                    *sample = pcm16_to_f32([b[0], b[1]]);
                }
                *pos += need;
                true
            }
            Feed::Queued {
                queue,
                buf,
                pos,
                refill_max_frames,
            } => {
                if *pos >= buf.len() {
                    *pos = 0;
                    buf.clear();
                    match queue.pop(PopStrategy::NonBlocking {
                        max_frames: *refill_max_frames,
                    }) {
                        Some(v) => *buf = v,
                        None => return false,
                    }
                }
                let Some(src) = buf.get(*pos..*pos + frame.len()) else {
                    return false;
                };
                frame.copy_from_slice(src);
                *pos += frame.len();
                true
            }
        }
    }

    /// No more frames will ever arrive.
    fn is_exhausted(&self) -> bool {
        match self {
            Feed::Direct { region, pos } => *pos >= region.len(),
            Feed::Queued { queue, buf, pos, .. } => {
                *pos >= buf.len() && queue.is_done() && queue.len_frames() == 0
            }
        }
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    feed: Feed,
    src_channels: usize,
    shared: Arc<CallbackShared>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, feed, src_channels, shared),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, feed, src_channels, shared),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, feed, src_channels, shared),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, feed, src_channels, shared),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: Feed,
    src_channels: usize,
    shared: Arc<CallbackShared>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = usize::from(config.channels).max(1);
    let mut frame = vec![0.0f32; src_channels.max(1)];
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            if !shared.running.load(Ordering::Relaxed) || shared.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let gain = StereoGain::from_packed(shared.gain.load(Ordering::Relaxed));
            let mut filled = 0u64;
            let mut starved = false;
            for out in data.chunks_mut(channels_out) {
                if starved || !feed.next_frame(&mut frame) {
                    starved = true;
                    out.fill(silence);
                    continue;
                }
                apply_gain(&mut frame, gain);
                for (ch, sample) in out.iter_mut().enumerate() {
                    *sample = <T as cpal::Sample>::from_sample::<f32>(map_channel(
                        &frame,
                        channels_out,
                        ch,
                    ));
                }
                filled += 1;
            }

            if filled > 0 {
                shared.played_frames.fetch_add(filled, Ordering::Relaxed);
            }
            if starved && feed.is_exhausted() && !shared.drained.swap(true, Ordering::Relaxed) {
                tracing::debug!("output buffer fully played");
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn apply_gain(frame: &mut [f32], gain: StereoGain) {
    match frame {
        [left, right, ..] => {
            *left *= gain.left_scale();
            *right *= gain.right_scale();
        }
        [mono] => *mono *= 0.5 * (gain.left_scale() + gain.right_scale()),
        [] => {}
    }
}

/// Sample for output channel `dst_ch`:
/// - stereo → mono: average L/R
/// - mono → any: duplicate
/// - otherwise: clamp to the last source channel
fn map_channel(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    let src = |ch: usize| frame.get(ch).copied().unwrap_or(0.0);
    match (frame.len(), dst_channels) {
        (2, 1) => 0.5 * (src(0) + src(1)),
        (1, _) => src(0),
        (n, _) => src(dst_ch.min(n.saturating_sub(1))),
    }
}
