use crate::format::MP3_BLOCK_SIZE;

/// Engine tuning parameters shared by the transcoder and the output stage.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Compressed bytes read per transcode step.
    pub block_size: usize,
    /// Default number of points returned by the waveform preview.
    pub preview_samples: usize,
    /// Output device substring; `None` uses the host default.
    pub output_device: Option<String>,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Resampler chunk size in frames (only used when the device cannot run at the track rate).
    pub chunk_frames: usize,
    /// Target buffer duration for the resampler queues.
    pub buffer_seconds: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: MP3_BLOCK_SIZE,
            preview_samples: 256,
            output_device: None,
            refill_max_frames: 4096,
            chunk_frames: 1024,
            buffer_seconds: 2.0,
        }
    }
}

impl EngineConfig {
    /// Trim the device name and drop it when blank.
    pub fn with_output_device(mut self, device: Option<String>) -> Self {
        self.output_device = device.and_then(|name| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });
        self
    }
}
