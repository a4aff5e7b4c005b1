//! Command runners for the `mp3play` binary.
//!
//! `play` keeps the engine on the main thread and drives it from a control channel fed by a
//! stdin reader thread and the Ctrl-C handler.

use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use mp3_engine::{EngineConfig, PlaybackEngine, PlaybackState};

use crate::config::PlayConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POSITION_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Interactive control command.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    Pause,
    Resume,
    Seek(f64),
    Volume { master: f32, balance: Option<f32> },
    Stop,
    /// Start a new session; defaults to the beginning of the track.
    Play(f64),
    Status,
    Quit,
}

/// Parse one line of user input. Blank lines yield `Ok(None)`.
pub fn parse_control(line: &str) -> Result<Option<Control>> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let control = match (cmd.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("pause", []) => Control::Pause,
        ("resume", []) => Control::Resume,
        ("seek", [secs]) => Control::Seek(parse_number(secs, "seek offset")?),
        ("vol" | "volume", [master]) => Control::Volume {
            master: parse_number(master, "volume")?,
            balance: None,
        },
        ("vol" | "volume", [master, balance]) => Control::Volume {
            master: parse_number(master, "volume")?,
            balance: Some(parse_number(balance, "balance")?),
        },
        ("stop", []) => Control::Stop,
        ("play", []) => Control::Play(0.0),
        ("play", [secs]) => Control::Play(parse_number(secs, "start offset")?),
        ("status", []) => Control::Status,
        ("quit" | "exit" | "q", []) => Control::Quit,
        (other, _) => return Err(anyhow!("unrecognized command: {other} {}", args.join(" "))),
    };
    Ok(Some(control))
}

fn parse_number<T: std::str::FromStr>(word: &str, what: &str) -> Result<T> {
    word.parse()
        .map_err(|_| anyhow!("invalid {what}: {word}"))
}

/// Print output devices to stdout.
pub fn list_devices() -> Result<()> {
    let devices = mp3_engine::device::list_devices()?;
    for (i, d) in devices.iter().enumerate() {
        let marker = if d.is_default { " (default)" } else { "" };
        println!(
            "#{i}: {}{marker} [{}-{} Hz]",
            d.name, d.min_rate, d.max_rate
        );
    }
    Ok(())
}

/// Print duration, format and tags.
pub fn run_info(config: EngineConfig, path: &Path, json: bool) -> Result<()> {
    let mut engine = PlaybackEngine::new(config);
    engine
        .open_file(path)
        .with_context(|| format!("open {}", path.display()))?;
    let status = engine.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    println!("file:      {}", path.display());
    println!("duration:  {:.3} s", status.duration_secs);
    println!("decoded:   {:.3} s", status.decoded_secs);
    if let Some(format) = status.format {
        println!(
            "format:    {} Hz, {} ch, {}-bit PCM",
            format.sample_rate, format.channels, format.bits_per_sample
        );
    }
    let meta = &status.metadata;
    println!("title:     {}", meta.title);
    println!("artist:    {}", meta.artist);
    println!("album:     {}", meta.album);
    println!("bitrate:   {} kbps", meta.bitrate / 1000);
    Ok(())
}

/// Print `samples` preview points, one per line or as a JSON array.
pub fn run_waveform(config: EngineConfig, path: &Path, samples: usize, json: bool) -> Result<()> {
    let mut engine = PlaybackEngine::new(config);
    engine
        .open_file(path)
        .with_context(|| format!("open {}", path.display()))?;
    let points = engine.waveform_preview(samples);
    if json {
        println!("{}", serde_json::to_string(&points)?);
    } else {
        for p in points {
            println!("{p:.4}");
        }
    }
    Ok(())
}

/// Play a file and serve control commands until the track ends or the user quits.
pub fn run_play(config: PlayConfig) -> Result<()> {
    let mut engine = PlaybackEngine::new(config.engine.clone());
    engine
        .open_file(&config.path)
        .with_context(|| format!("open {}", config.path.display()))?;
    let meta = engine.metadata();
    if !meta.album.is_empty() {
        tracing::info!(album = %meta.album, "album");
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    {
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(Control::Quit);
        })
        .context("install Ctrl-C handler")?;
    }
    spawn_stdin_reader(tx);

    let mut volume = config.volume;
    let mut balance = config.balance;
    engine.set_volume(volume, balance)?;
    engine.play(config.start_secs)?;

    control_loop(&mut engine, &rx, &mut volume, &mut balance)?;
    engine.close();
    Ok(())
}

fn control_loop(
    engine: &mut PlaybackEngine,
    rx: &Receiver<Control>,
    volume: &mut f32,
    balance: &mut f32,
) -> Result<()> {
    let mut last_log = Instant::now();
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Control::Quit) => {
                tracing::info!("quit");
                return Ok(());
            }
            Ok(cmd) => {
                if let Err(e) = apply_control(engine, cmd, volume, balance) {
                    tracing::warn!("command failed: {e:#}");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if engine.is_finished() {
            tracing::info!("end of track");
            return Ok(());
        }
        if engine.state() == PlaybackState::Playing && last_log.elapsed() >= POSITION_LOG_INTERVAL {
            tracing::info!(
                position_secs = format_args!("{:.1}", engine.position()),
                duration_secs = format_args!("{:.1}", engine.duration()),
                "position"
            );
            last_log = Instant::now();
        }
    }
}

fn apply_control(
    engine: &mut PlaybackEngine,
    cmd: Control,
    volume: &mut f32,
    balance: &mut f32,
) -> Result<()> {
    match cmd {
        Control::Pause => engine.pause()?,
        Control::Resume => engine.resume()?,
        Control::Seek(secs) => {
            let was_paused = engine.is_paused();
            engine.play(secs)?;
            if was_paused {
                engine.pause()?;
            }
            tracing::info!(position_secs = engine.position(), "seek");
        }
        Control::Volume { master, balance: b } => {
            *volume = master;
            if let Some(b) = b {
                *balance = b;
            }
            let gain = engine.set_volume(*volume, *balance)?;
            tracing::info!(left = gain.left, right = gain.right, "volume");
        }
        Control::Stop => {
            engine.stop();
            tracing::info!("stopped");
        }
        Control::Play(secs) => engine.play(secs)?,
        Control::Status => println!("{}", serde_json::to_string(&engine.status())?),
        Control::Quit => {}
    }
    Ok(())
}

/// Forward parsed stdin lines to `tx`. EOF ends the reader but not playback.
fn spawn_stdin_reader(tx: Sender<Control>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_control(&line) {
                Ok(Some(cmd)) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("{e}"),
            }
        }
        tracing::debug!("stdin closed");
    });
}
