//! Output device boundary.
//!
//! An [`OutputService`] opens devices for a PCM format; an [`OutputDevice`] plays one prepared
//! region of the decoded buffer. [`PlaybackSession`] owns an open device for the lifetime of one
//! `play` call and tears it down in order (reset, unprepare, close) when dropped.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::format::PcmFormat;
use crate::position::StereoGain;

/// A read-only slice of the shared PCM buffer, starting at a frame-aligned byte offset.
#[derive(Clone, Debug)]
pub struct PcmRegion {
    pcm: Arc<Vec<u8>>,
    start: usize,
}

impl PcmRegion {
    pub fn new(pcm: Arc<Vec<u8>>, start: usize) -> Result<Self> {
        if start >= pcm.len() {
            return Err(anyhow!(
                "region start {start} outside buffer of {} bytes",
                pcm.len()
            ));
        }
        Ok(Self { pcm, start })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.pcm.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.pcm[self.start..]
    }
}

/// One open output device.
///
/// Dropping the device closes it.
pub trait OutputDevice {
    /// Register `region` as the single buffer to play.
    fn prepare(&mut self, region: PcmRegion) -> Result<()>;
    /// Submit the prepared buffer; playback starts immediately.
    fn write(&mut self) -> Result<()>;
    fn unprepare(&mut self) -> Result<()>;
    /// Stop output and return the buffer.
    fn reset(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    /// Frames of the track's PCM format played since `write`.
    fn elapsed_frames(&self) -> Result<u64>;
    fn set_gain(&mut self, gain: StereoGain) -> Result<()>;
    /// The whole region has been played out.
    fn is_drained(&self) -> bool;
}

/// Opens output devices.
pub trait OutputService {
    type Device: OutputDevice;

    fn open(&self, format: &PcmFormat) -> Result<Self::Device>;
    /// Gain applied to devices opened later.
    fn set_default_gain(&self, gain: StereoGain) -> Result<()>;
}

/// Device state for one `play` call.
pub struct PlaybackSession<D: OutputDevice> {
    device: D,
    prepared: bool,
    paused: bool,
}

impl<D: OutputDevice> PlaybackSession<D> {
    /// Open a device, prepare `region` and start writing it.
    ///
    /// Any failure after the device opened tears down what was already set up.
    pub fn start<S>(service: &S, format: &PcmFormat, region: PcmRegion) -> Result<Self>
    where
        S: OutputService<Device = D>,
    {
        let device = service.open(format).context("open output")?;
        let mut session = Self {
            device,
            prepared: false,
            paused: false,
        };
        session
            .device
            .prepare(region)
            .context("prepare output buffer")?;
        session.prepared = true;
        session.device.write().context("write output buffer")?;
        Ok(session)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) -> Result<()> {
        if !self.paused {
            self.device.pause().context("pause output")?;
            self.paused = true;
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.paused {
            self.device.resume().context("resume output")?;
            self.paused = false;
        }
        Ok(())
    }

    pub fn elapsed_frames(&self) -> Result<u64> {
        self.device.elapsed_frames()
    }

    pub fn set_gain(&mut self, gain: StereoGain) -> Result<()> {
        self.device.set_gain(gain)
    }

    pub fn is_drained(&self) -> bool {
        self.device.is_drained()
    }
}

impl<D: OutputDevice> Drop for PlaybackSession<D> {
    fn drop(&mut self) {
        if let Err(err) = self.device.reset() {
            tracing::warn!("output reset failed: {err:#}");
        }
        if self.prepared {
            if let Err(err) = self.device.unprepare() {
                tracing::warn!("output unprepare failed: {err:#}");
            }
        }
        tracing::debug!("playback session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DeviceEvent, FakeOutput};

    fn region(len: usize, start: usize) -> PcmRegion {
        PcmRegion::new(Arc::new(vec![0u8; len]), start).unwrap()
    }

    #[test]
    fn region_rejects_start_past_end() {
        let pcm = Arc::new(vec![0u8; 8]);
        assert!(PcmRegion::new(pcm.clone(), 8).is_err());
        let r = PcmRegion::new(pcm, 4).unwrap();
        assert_eq!(r.len(), 4);
        assert_eq!(r.start(), 4);
    }

    #[test]
    fn session_runs_full_lifecycle_in_order() {
        let output = FakeOutput::default();
        let session = PlaybackSession::start(&output, &PcmFormat::CD_STEREO, region(16, 4)).unwrap();
        drop(session);
        assert_eq!(
            output.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Prepare { start: 4, len: 12 },
                DeviceEvent::Write,
                DeviceEvent::Reset,
                DeviceEvent::Unprepare,
                DeviceEvent::Close,
            ]
        );
    }

    #[test]
    fn failed_write_still_tears_down() {
        let output = FakeOutput::default();
        output.fail_write(true);
        let err = PlaybackSession::start(&output, &PcmFormat::CD_STEREO, region(16, 0))
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("write output buffer"));
        assert_eq!(
            output.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Prepare { start: 0, len: 16 },
                DeviceEvent::Reset,
                DeviceEvent::Unprepare,
                DeviceEvent::Close,
            ]
        );
    }

    #[test]
    fn failed_open_leaves_nothing_behind() {
        let output = FakeOutput::default();
        output.fail_open(true);
        assert!(PlaybackSession::start(&output, &PcmFormat::CD_STEREO, region(16, 0)).is_err());
        assert!(output.events().is_empty());
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let output = FakeOutput::default();
        let mut session =
            PlaybackSession::start(&output, &PcmFormat::CD_STEREO, region(16, 0)).unwrap();
        session.pause().unwrap();
        session.pause().unwrap();
        assert!(session.is_paused());
        session.resume().unwrap();
        session.resume().unwrap();
        assert!(!session.is_paused());
        let pauses = output
            .events()
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Pause | DeviceEvent::Resume))
            .count();
        assert_eq!(pauses, 2);
    }
}
