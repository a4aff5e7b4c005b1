use std::path::PathBuf;

use mp3_engine::EngineConfig;

use crate::cli::Args;

/// Settings for the `play` subcommand.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub start_secs: f64,
    pub volume: f32,
    pub balance: f32,
    pub engine: EngineConfig,
}

/// Engine tuning from the global flags.
pub fn engine_config(args: &Args) -> EngineConfig {
    EngineConfig {
        block_size: args.block_size,
        refill_max_frames: args.refill_max_frames,
        chunk_frames: args.chunk_frames,
        buffer_seconds: args.buffer_seconds,
        ..EngineConfig::default()
    }
    .with_output_device(args.device.clone())
}
