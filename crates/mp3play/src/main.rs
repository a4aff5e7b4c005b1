//! mp3play: a small CLI around `mp3-engine` that decodes an MP3 file up front and plays it via
//! CPAL.
//!
//! ## Modes
//! - `play`: play a file, with `pause`/`resume`/`seek`/`vol`/`stop`/`play`/`status`/`quit`
//!   read from stdin.
//! - `info`: print duration, PCM format and tags.
//! - `waveform`: print the amplitude preview.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,mp3play=info,mp3_engine=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let engine = config::engine_config(&args);
    match args.cmd {
        Some(cli::Command::Play {
            path,
            start,
            volume,
            balance,
        }) => runtime::run_play(config::PlayConfig {
            path,
            start_secs: start,
            volume,
            balance,
            engine,
        }),
        Some(cli::Command::Info { path, json }) => runtime::run_info(engine, &path, json),
        Some(cli::Command::Waveform {
            path,
            samples,
            json,
        }) => runtime::run_waveform(engine, &path, samples, json),
        None => {
            cli::Args::command().print_help()?;
            Ok(())
        }
    }
}
