//! Decode-and-playback engine.
//!
//! [`PlaybackEngine`] owns at most one decoded track and at most one playback session on it.
//! The lifecycle state is derived from that ownership:
//! - no track: [`PlaybackState::Closed`]
//! - track without session: `Stopped`
//! - track with session: `Playing` or `Paused`
//!
//! All operations are synchronous and meant to be called from one control thread.

use std::path::Path;
use std::sync::Arc;

use crate::codec::{CodecService, SymphoniaMp3Codec};
use crate::config::EngineConfig;
use crate::container::{ContainerService, TrackMetadata, read_track_info};
use crate::error::{EngineError, EngineResult};
use crate::format::{InputProfile, PcmFormat};
use crate::output::{OutputDevice, OutputService, PcmRegion, PlaybackSession};
use crate::playback::CpalOutput;
use crate::position::{self, StereoGain};
use crate::probe::SymphoniaContainer;
use crate::status::{EngineStatus, PlaybackState};
use crate::transcode::{TranscodeScratch, pcm_capacity, transcode};
use crate::waveform;

/// A fully decoded track plus the session playing it, if any.
struct LoadedTrack<D: OutputDevice> {
    duration_secs: f64,
    format: PcmFormat,
    pcm: Arc<Vec<u8>>,
    metadata: TrackMetadata,
    session: Option<PlaybackSession<D>>,
    /// Seconds at the start byte of the current session.
    start_offset_secs: f64,
}

impl<D: OutputDevice> LoadedTrack<D> {
    fn state(&self) -> PlaybackState {
        match &self.session {
            None => PlaybackState::Stopped,
            Some(session) if session.is_paused() => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
        }
    }

    fn position_secs(&self) -> f64 {
        let Some(session) = &self.session else {
            return self.start_offset_secs;
        };
        match session.elapsed_frames() {
            Ok(frames) => position::position_secs(
                frames,
                self.format.sample_rate,
                self.start_offset_secs,
                self.duration_secs,
            ),
            Err(err) => {
                tracing::warn!("output position query failed: {err:#}");
                self.start_offset_secs
            }
        }
    }
}

/// MP3 decode-and-playback engine.
///
/// The three service parameters default to the Symphonia container reader, the Symphonia MP3
/// block codec and the CPAL output.
pub struct PlaybackEngine<C = SymphoniaContainer, K = SymphoniaMp3Codec, O = CpalOutput>
where
    C: ContainerService,
    K: CodecService,
    O: OutputService,
{
    container: C,
    codec: K,
    output: O,
    config: EngineConfig,
    profile: InputProfile,
    scratch: TranscodeScratch,
    track: Option<LoadedTrack<O::Device>>,
    equalizer_gains: Vec<f32>,
}

impl PlaybackEngine {
    /// Engine on the default Symphonia and CPAL services.
    pub fn new(config: EngineConfig) -> Self {
        let output = CpalOutput::new(&config);
        Self::with_services(SymphoniaContainer, SymphoniaMp3Codec, output, config)
    }
}

impl<C, K, O> PlaybackEngine<C, K, O>
where
    C: ContainerService,
    K: CodecService,
    O: OutputService,
{
    /// Engine over explicit container, codec and output services.
    pub fn with_services(container: C, codec: K, output: O, config: EngineConfig) -> Self {
        Self {
            container,
            codec,
            output,
            config,
            profile: InputProfile::MP3_STEREO_44K,
            scratch: TranscodeScratch::default(),
            track: None,
            equalizer_gains: Vec::new(),
        }
    }

    /// Tuning the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close any open track, then parse, validate and fully transcode `bytes`.
    ///
    /// On failure the engine is left closed.
    pub fn open(&mut self, bytes: impl Into<Arc<Vec<u8>>>) -> EngineResult<()> {
        self.close();
        let bytes: Arc<Vec<u8>> = bytes.into();
        if bytes.is_empty() {
            return Err(EngineError::Input("input buffer is empty".into()));
        }

        let reader = self
            .container
            .open(bytes.clone())
            .map_err(|e| EngineError::format(e.context("open container")))?;
        let info = read_track_info(&reader, &self.profile).map_err(EngineError::format)?;
        drop(reader);

        let format = self.profile.output_format();
        let mut session = self
            .codec
            .open_session(&self.profile, &format)
            .map_err(|e| EngineError::codec(e.context("open conversion session")))?;
        let capacity = pcm_capacity(info.duration_secs, &format);
        let out = transcode(
            bytes.as_slice(),
            &mut session,
            &mut self.scratch,
            self.config.block_size,
            capacity,
            &format,
        )?;
        drop(session);

        tracing::info!(
            duration_secs = info.duration_secs,
            decoded_secs = position::seconds_at_byte(out.pcm.len(), &format),
            blocks = out.blocks,
            pcm_bytes = out.pcm.len(),
            title = %info.metadata.title,
            artist = %info.metadata.artist,
            bitrate = info.metadata.bitrate,
            "track opened"
        );

        self.track = Some(LoadedTrack {
            duration_secs: info.duration_secs,
            format,
            pcm: Arc::new(out.pcm),
            metadata: info.metadata,
            session: None,
            start_offset_secs: 0.0,
        });
        Ok(())
    }

    /// Read `path` into memory and [`open`](Self::open) it.
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            self.close();
            EngineError::Input(format!("read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "file loaded");
        self.open(bytes)
    }

    /// Start playback at `start_secs`, replacing any current session.
    ///
    /// The start is clamped to the track, aligned down to a whole PCM frame and backed off by one
    /// frame at the very end. On device failure the track stays open and stopped.
    pub fn play(&mut self, start_secs: f64) -> EngineResult<()> {
        let track = self.track.as_mut().ok_or(EngineError::NotOpen)?;
        track.session = None;
        track.start_offset_secs = 0.0;

        let start = position::start_byte_for(
            start_secs,
            track.duration_secs,
            track.pcm.len(),
            &track.format,
        )
        .ok_or(EngineError::EmptyBuffer)?;
        let region = PcmRegion::new(track.pcm.clone(), start).map_err(EngineError::device)?;
        let session = PlaybackSession::start(&self.output, &track.format, region)
            .map_err(EngineError::device)?;

        track.start_offset_secs = position::seconds_at_byte(start, &track.format);
        track.session = Some(session);
        tracing::info!(
            requested_secs = start_secs,
            start_secs = track.start_offset_secs,
            start_byte = start,
            "playback started"
        );
        Ok(())
    }

    /// Pause the current session; no-op when nothing is playing.
    pub fn pause(&mut self) -> EngineResult<()> {
        if let Some(session) = self.session_mut() {
            session.pause().map_err(EngineError::device)?;
        }
        Ok(())
    }

    /// Resume a paused session; no-op otherwise.
    pub fn resume(&mut self) -> EngineResult<()> {
        if let Some(session) = self.session_mut() {
            session.resume().map_err(EngineError::device)?;
        }
        Ok(())
    }

    /// Release the output device. The decoded track stays loaded.
    pub fn stop(&mut self) {
        if let Some(track) = self.track.as_mut() {
            if track.session.take().is_some() {
                tracing::debug!("playback stopped");
            }
            track.start_offset_secs = 0.0;
        }
    }

    /// Stop and free the decoded track.
    pub fn close(&mut self) {
        self.stop();
        if self.track.take().is_some() {
            tracing::debug!("track closed");
        }
    }

    /// Apply `master` volume and stereo `balance`.
    ///
    /// The gain goes to the active device and to the output's default target, so later sessions
    /// keep it. Returns the gain words that were applied.
    pub fn set_volume(&mut self, master: f32, balance: f32) -> EngineResult<StereoGain> {
        let gain = StereoGain::from_controls(master, balance);
        if let Some(session) = self.session_mut() {
            session.set_gain(gain).map_err(EngineError::device)?;
        }
        self.output
            .set_default_gain(gain)
            .map_err(EngineError::device)?;
        tracing::debug!(left = gain.left, right = gain.right, "volume set");
        Ok(gain)
    }

    /// Current position in seconds, clamped to the duration.
    pub fn position(&self) -> f64 {
        self.track.as_ref().map_or(0.0, LoadedTrack::position_secs)
    }

    /// Container duration in seconds; 0 when closed.
    pub fn duration(&self) -> f64 {
        self.track.as_ref().map_or(0.0, |t| t.duration_secs)
    }

    /// Lifecycle state derived from the loaded track and session.
    pub fn state(&self) -> PlaybackState {
        self.track
            .as_ref()
            .map_or(PlaybackState::Closed, LoadedTrack::state)
    }

    /// A track is decoded and loaded.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// A session exists, paused or not.
    pub fn is_playing(&self) -> bool {
        self.state().has_session()
    }

    /// A session exists and is paused.
    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    /// The current session has played its whole region.
    pub fn is_finished(&self) -> bool {
        self.track
            .as_ref()
            .and_then(|t| t.session.as_ref())
            .is_some_and(PlaybackSession::is_drained)
    }

    /// Metadata of the open track; empty when closed.
    pub fn metadata(&self) -> TrackMetadata {
        self.track
            .as_ref()
            .map(|t| t.metadata.clone())
            .unwrap_or_default()
    }

    /// Amplitude preview with `points` values (see [`waveform::preview`]).
    pub fn waveform_preview(&self, points: usize) -> Vec<f32> {
        self.track
            .as_ref()
            .map(|t| waveform::preview(&t.pcm, &t.format, points))
            .unwrap_or_default()
    }

    /// Amplitude preview with the configured number of points.
    pub fn waveform(&self) -> Vec<f32> {
        self.waveform_preview(self.config.preview_samples)
    }

    /// Store per-band equalizer gains in dB. They are not applied to the output.
    pub fn set_equalizer_gains(&mut self, gains: &[f32]) {
        self.equalizer_gains = gains.to_vec();
        tracing::debug!(bands = gains.len(), "equalizer gains stored");
    }

    /// Gains last passed to [`set_equalizer_gains`](Self::set_equalizer_gains).
    pub fn equalizer_gains(&self) -> &[f32] {
        &self.equalizer_gains
    }

    /// Snapshot of state, position and track facts.
    pub fn status(&self) -> EngineStatus {
        let Some(track) = &self.track else {
            return EngineStatus::closed();
        };
        EngineStatus {
            state: track.state(),
            position_secs: track.position_secs(),
            duration_secs: track.duration_secs,
            start_offset_secs: track.start_offset_secs,
            decoded_secs: position::seconds_at_byte(track.pcm.len(), &track.format),
            finished: self.is_finished(),
            metadata: track.metadata.clone(),
            format: Some(track.format),
        }
    }

    fn session_mut(&mut self) -> Option<&mut PlaybackSession<O::Device>> {
        self.track.as_mut().and_then(|t| t.session.as_mut())
    }
}

impl<C, K, O> Drop for PlaybackEngine<C, K, O>
where
    C: ContainerService,
    K: CodecService,
    O: OutputService,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{TagKey, TagValue};
    use crate::frame::tests::{STEREO_128K, silent_frames};
    use crate::testing::{DeviceEvent, FakeCodec, FakeContainer, FakeOutput, FakeReader};

    type TestEngine = PlaybackEngine<FakeContainer, FakeCodec, FakeOutput>;

    const ONE_SECOND: u64 = 10_000_000;
    /// 441-byte blocks expanded 4x give 441 PCM frames each, so 100 blocks are one second.
    const BLOCK: usize = 441;

    fn engine(reader: FakeReader, codec: FakeCodec) -> (TestEngine, FakeOutput) {
        let output = FakeOutput::default();
        let config = EngineConfig {
            block_size: BLOCK,
            ..EngineConfig::default()
        };
        let engine =
            PlaybackEngine::with_services(FakeContainer::with(reader), codec, output.clone(), config);
        (engine, output)
    }

    fn open_one_second() -> (TestEngine, FakeOutput) {
        let (mut engine, output) = engine(
            FakeReader::stereo_mp3(ONE_SECOND),
            FakeCodec {
                ratio: 4,
                refuse: false,
            },
        );
        engine.open(vec![0x11u8; BLOCK * 100]).unwrap();
        (engine, output)
    }

    fn prepared_regions(output: &FakeOutput) -> Vec<(usize, usize)> {
        output
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Prepare { start, len } => Some((start, len)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_then_close() {
        let (mut engine, _output) = open_one_second();
        assert!(engine.is_open());
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.duration(), 1.0);
        assert_eq!(engine.position(), 0.0);
        assert_eq!(engine.status().decoded_secs, 1.0);

        engine.close();
        assert!(!engine.is_open());
        assert_eq!(engine.duration(), 0.0);
        assert_eq!(engine.state(), PlaybackState::Closed);
    }

    #[test]
    fn failed_open_closes_previous_track() {
        let (mut engine, output) = open_one_second();
        engine.play(0.0).unwrap();
        engine.container = FakeContainer::rejecting();

        let err = engine.open(vec![1u8; 10]).unwrap_err();
        assert!(matches!(err, EngineError::Format(ref m) if m.contains("open container")));
        assert_eq!(engine.state(), PlaybackState::Closed);
        assert_eq!(output.open_devices(), 0);
    }

    #[test]
    fn open_rejects_profile_mismatch() {
        let mut reader = FakeReader::stereo_mp3(ONE_SECOND);
        reader.format.channels = 1;
        let (mut engine, _) = engine(reader, FakeCodec::default());
        let err = engine.open(vec![0u8; BLOCK]).unwrap_err();
        assert!(matches!(err, EngineError::Format(ref m) if m.contains("channel")));
        assert!(!engine.is_open());
    }

    #[test]
    fn open_reports_codec_and_input_failures() {
        let (mut engine, _) = engine(
            FakeReader::stereo_mp3(ONE_SECOND),
            FakeCodec {
                ratio: 1,
                refuse: true,
            },
        );
        let err = engine.open(vec![0u8; BLOCK]).unwrap_err();
        assert!(matches!(err, EngineError::Codec(ref m) if m.contains("conversion session")));
        assert!(!engine.is_open());

        let err = engine.open(Vec::new()).unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
    }

    #[test]
    fn open_file_reads_from_disk() {
        let (mut engine, _) = engine(
            FakeReader::stereo_mp3(ONE_SECOND),
            FakeCodec {
                ratio: 4,
                refuse: false,
            },
        );
        let path = std::env::temp_dir().join(format!("mp3-engine-open-{}.mp3", std::process::id()));
        std::fs::write(&path, vec![0u8; BLOCK * 10]).unwrap();
        let opened = engine.open_file(&path);
        std::fs::remove_file(&path).unwrap();
        opened.unwrap();
        assert!(engine.is_open());

        let err = engine.open_file(path.with_extension("missing")).unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
        assert!(!engine.is_open());
    }

    #[test]
    fn open_keeps_the_transcoded_allocation() {
        let (mut engine, _) = engine(
            FakeReader::stereo_mp3(ONE_SECOND * 3 / 2),
            FakeCodec {
                ratio: 4,
                refuse: false,
            },
        );
        let input = Arc::new(vec![0x11u8; BLOCK * 100]);
        engine.open(input.clone()).unwrap();
        assert_eq!(Arc::strong_count(&input), 1);

        let track = engine.track.as_ref().unwrap();
        // Reserved for two seconds, filled with one: a copied buffer would be trimmed to its length.
        assert_eq!(track.pcm.len(), PcmFormat::CD_STEREO.bytes_per_second());
        assert!(track.pcm.capacity() >= pcm_capacity(1.5, &PcmFormat::CD_STEREO));
    }

    #[test]
    fn open_reports_unsatisfiable_pcm_reservation() {
        let (mut engine, output) = engine(
            FakeReader::stereo_mp3(u64::MAX),
            FakeCodec {
                ratio: 4,
                refuse: false,
            },
        );
        let err = engine.open(vec![0u8; BLOCK]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::OutOfMemory {
                what: "pcm buffer",
                ..
            }
        ));
        assert!(!engine.is_open());
        assert_eq!(engine.state(), PlaybackState::Closed);
        assert!(output.events().is_empty());
    }

    #[test]
    fn play_requires_an_open_track() {
        let (mut engine, output) = engine(FakeReader::stereo_mp3(ONE_SECOND), FakeCodec::default());
        assert!(matches!(engine.play(0.0), Err(EngineError::NotOpen)));
        assert!(output.events().is_empty());
    }

    #[test]
    fn play_rejects_empty_pcm() {
        let (mut engine, output) = engine(
            FakeReader::stereo_mp3(ONE_SECOND),
            FakeCodec {
                ratio: 0,
                refuse: false,
            },
        );
        engine.open(vec![0u8; BLOCK * 4]).unwrap();
        assert!(matches!(engine.play(0.0), Err(EngineError::EmptyBuffer)));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(output.events().is_empty());
    }

    #[test]
    fn play_records_aligned_start_offset() {
        let (mut engine, output) = open_one_second();
        engine.play(0.5).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(prepared_regions(&output), vec![(88_200, 88_200)]);
        assert_eq!(engine.position(), 0.5);

        output.set_elapsed_frames(4_410);
        assert!((engine.position() - 0.6).abs() < 1e-9);

        output.set_elapsed_frames(44_100 * 3);
        assert_eq!(engine.position(), 1.0);
    }

    #[test]
    fn play_near_end_keeps_one_frame() {
        let (mut engine, output) = open_one_second();
        engine.play(1.0).unwrap();
        engine.play(42.0).unwrap();
        engine.play(-3.0).unwrap();
        engine.play(f64::NAN).unwrap();
        assert_eq!(
            prepared_regions(&output),
            vec![(176_396, 4), (176_396, 4), (0, 176_400), (0, 176_400)]
        );
    }

    #[test]
    fn replaying_tears_down_previous_session_first() {
        let (mut engine, output) = open_one_second();
        engine.play(0.0).unwrap();
        engine.play(0.25).unwrap();
        assert_eq!(
            output.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Prepare { start: 0, len: 176_400 },
                DeviceEvent::Write,
                DeviceEvent::Reset,
                DeviceEvent::Unprepare,
                DeviceEvent::Close,
                DeviceEvent::Open,
                DeviceEvent::Prepare {
                    start: 44_100,
                    len: 132_300
                },
                DeviceEvent::Write,
            ]
        );
        assert_eq!(output.open_devices(), 1);
    }

    #[test]
    fn device_failures_leave_track_stopped() {
        let (mut engine, output) = open_one_second();
        engine.play(0.3).unwrap();

        output.fail_open(true);
        let err = engine.play(0.0).unwrap_err();
        assert!(matches!(err, EngineError::Device(ref m) if m.contains("open output")));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.position(), 0.0);
        assert_eq!(output.open_devices(), 0);

        output.fail_open(false);
        output.fail_write(true);
        assert!(matches!(engine.play(0.0), Err(EngineError::Device(_))));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(output.open_devices(), 0);
    }

    #[test]
    fn pause_resume_round_trip_keeps_position() {
        let (mut engine, output) = open_one_second();
        engine.play(0.0).unwrap();
        output.set_elapsed_frames(22_050);

        engine.pause().unwrap();
        assert!(engine.is_playing());
        assert!(engine.is_paused());
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.position(), 0.5);

        engine.resume().unwrap();
        assert!(engine.is_playing());
        assert!(!engine.is_paused());
        assert_eq!(engine.position(), 0.5);

        let events = output.events();
        assert_eq!(events.iter().filter(|e| **e == DeviceEvent::Open).count(), 1);
        assert!(events.contains(&DeviceEvent::Pause));
        assert!(events.contains(&DeviceEvent::Resume));
    }

    #[test]
    fn pause_and_resume_without_session_are_no_ops() {
        let (mut engine, output) = engine(FakeReader::stereo_mp3(ONE_SECOND), FakeCodec::default());
        engine.pause().unwrap();
        engine.resume().unwrap();
        assert_eq!(engine.state(), PlaybackState::Closed);

        assert!(output.events().is_empty());

        let (mut engine, output) = open_one_second();
        engine.pause().unwrap();
        engine.resume().unwrap();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(output.events().is_empty());
    }

    #[test]
    fn stop_and_close_are_idempotent() {
        let (mut engine, output) = engine(FakeReader::stereo_mp3(ONE_SECOND), FakeCodec::default());
        engine.stop();
        engine.close();
        engine.close();
        assert_eq!(engine.state(), PlaybackState::Closed);
        assert!(output.events().is_empty());

        let (mut engine, output) = open_one_second();
        engine.play(0.5).unwrap();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.position(), 0.0);
        let closes = output
            .events()
            .iter()
            .filter(|e| **e == DeviceEvent::Close)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn volume_goes_to_default_target_when_closed() {
        let (mut engine, output) = engine(FakeReader::stereo_mp3(ONE_SECOND), FakeCodec::default());
        let gain = engine.set_volume(1.0, 0.0).unwrap();
        assert_eq!(gain.packed(), 0xFFFF_FFFF);
        assert_eq!(output.events(), vec![DeviceEvent::DefaultGain(StereoGain::UNITY)]);
    }

    #[test]
    fn volume_goes_to_active_device() {
        let (mut engine, output) = open_one_second();
        engine.play(0.0).unwrap();
        output.clear_events();

        let gain = engine.set_volume(1.0, -1.0).unwrap();
        assert_eq!((gain.left, gain.right), (0xFFFF, 0));
        assert_eq!(
            output.events(),
            vec![DeviceEvent::Gain(gain), DeviceEvent::DefaultGain(gain)]
        );

        let gain = engine.set_volume(7.0, 1.0).unwrap();
        assert_eq!((gain.left, gain.right), (0, 0xFFFF));
    }

    #[test]
    fn waveform_preview_sizes() {
        let (engine, _) = open_one_second();
        let points = engine.waveform();
        assert_eq!(points.len(), 256);
        let expected = f32::from(0x1111i16) / 32_768.0;
        assert!(points.iter().all(|v| *v == expected));

        let (mut short, _) = engine_pair_with_ratio(1);
        short.open(vec![0u8; BLOCK]).unwrap();
        // 441 bytes truncated to 110 whole frames
        assert_eq!(short.waveform_preview(256).len(), 110);
        short.close();
        assert!(short.waveform_preview(256).is_empty());
    }

    fn engine_pair_with_ratio(ratio: usize) -> (TestEngine, FakeOutput) {
        engine(
            FakeReader::stereo_mp3(ONE_SECOND),
            FakeCodec {
                ratio,
                refuse: false,
            },
        )
    }

    #[test]
    fn metadata_and_status_reflect_track() {
        let reader = FakeReader::stereo_mp3(ONE_SECOND)
            .with_tag(TagKey::Title, TagValue::Text("Intro".into()))
            .with_tag(TagKey::Album, TagValue::Text("Demo".into()))
            .with_tag(TagKey::Bitrate, TagValue::Number(128_000));
        let (mut engine, output) = engine(
            reader,
            FakeCodec {
                ratio: 4,
                refuse: false,
            },
        );
        assert_eq!(engine.metadata(), TrackMetadata::default());

        engine.open(vec![0u8; BLOCK * 100]).unwrap();
        let meta = engine.metadata();
        assert_eq!(meta.title, "Intro");
        assert_eq!(meta.album, "Demo");
        assert_eq!(meta.artist, "");
        assert_eq!(meta.bitrate, 128_000);

        engine.play(0.25).unwrap();
        output.set_drained(true);
        let status = engine.status();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.start_offset_secs, 0.25);
        assert!(status.finished);
        assert_eq!(status.format, Some(PcmFormat::CD_STEREO));
    }

    #[test]
    fn equalizer_gains_are_stored_only() {
        let (mut engine, output) = open_one_second();
        engine.set_equalizer_gains(&[0.0, 3.5, -2.0]);
        assert_eq!(engine.equalizer_gains(), &[0.0, 3.5, -2.0]);
        assert!(output.events().is_empty());
    }

    #[test]
    fn dropping_engine_releases_device() {
        let (mut engine, output) = open_one_second();
        engine.play(0.0).unwrap();
        assert_eq!(output.open_devices(), 1);
        drop(engine);
        assert_eq!(output.open_devices(), 0);
        assert_eq!(output.events().last(), Some(&DeviceEvent::Close));
    }

    #[test]
    fn decodes_mp3_frames_through_symphonia() {
        let output = FakeOutput::default();
        let mut engine = PlaybackEngine::with_services(
            SymphoniaContainer,
            SymphoniaMp3Codec,
            output.clone(),
            EngineConfig::default(),
        );
        engine.open(silent_frames(STEREO_128K, 40)).unwrap();
        assert!(engine.duration() > 0.0);
        assert_eq!(engine.metadata().bitrate, 128_000);

        let status = engine.status();
        assert!(status.decoded_secs > 0.5);
        assert!(engine.waveform().iter().all(|v| *v == 0.0));

        engine.play(0.0).unwrap();
        assert!(engine.is_playing());
        assert_eq!(output.open_devices(), 1);
    }
}
