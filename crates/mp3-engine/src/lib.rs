//! MP3 decode-and-playback engine.
//!
//! Opens an MPEG-1 Layer III (44.1 kHz stereo) buffer, transcodes it up front to 16-bit PCM and
//! plays any sub-range of it through a CPAL output device. See [`engine::PlaybackEngine`].

pub mod codec;
pub mod config;
pub mod container;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod frame;
pub mod output;
pub mod playback;
pub mod position;
pub mod probe;
pub mod queue;
pub mod resample;
pub mod status;
pub mod transcode;
pub mod waveform;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use engine::PlaybackEngine;
pub use error::{EngineError, EngineResult};
pub use status::{EngineStatus, PlaybackState};
