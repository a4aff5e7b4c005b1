use serde::Serialize;

use crate::container::TrackMetadata;
use crate::format::PcmFormat;

/// Lifecycle state of a [`crate::engine::PlaybackEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No track loaded.
    Closed,
    /// Track decoded, no output device.
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_open(self) -> bool {
        self != PlaybackState::Closed
    }

    /// A playback session exists (playing or paused).
    pub fn has_session(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

/// Point-in-time snapshot of the engine for display or JSON output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: PlaybackState,
    pub position_secs: f64,
    pub duration_secs: f64,
    /// Offset the current (or last) session started from.
    pub start_offset_secs: f64,
    /// Length of the decoded PCM in seconds (may be shorter than the container duration).
    pub decoded_secs: f64,
    /// The session has played its whole region.
    pub finished: bool,
    pub metadata: TrackMetadata,
    /// Decoded PCM layout; `None` while closed.
    pub format: Option<PcmFormat>,
}

impl EngineStatus {
    pub fn closed() -> Self {
        Self {
            state: PlaybackState::Closed,
            position_secs: 0.0,
            duration_secs: 0.0,
            start_offset_secs: 0.0,
            decoded_secs: 0.0,
            finished: false,
            metadata: TrackMetadata::default(),
            format: None,
        }
    }
}
