use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "mp3play", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Resampler input chunk size in frames (only used when the device cannot run at 44.1 kHz)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,

    /// Resampler queue buffer target in seconds (per stage)
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,

    /// Compressed bytes handed to the decoder per step
    #[arg(long, default_value_t = 522)]
    pub block_size: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode an MP3 file and play it, reading control commands from stdin
    Play {
        /// Path to an MPEG-1 Layer III file (44.1 kHz stereo)
        path: PathBuf,

        /// Start offset in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Master volume, 0.0 to 1.0
        #[arg(long, default_value_t = 1.0)]
        volume: f32,

        /// Stereo balance, -1.0 (left) to 1.0 (right)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        balance: f32,
    },

    /// Print duration, PCM format and tags of a file
    Info {
        path: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the amplitude preview of a file
    Waveform {
        path: PathBuf,

        /// Number of preview points
        #[arg(long, default_value_t = 256)]
        samples: usize,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
