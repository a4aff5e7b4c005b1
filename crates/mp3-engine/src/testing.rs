//! In-memory service fakes for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::codec::{CodecService, CodecSession};
use crate::container::{ContainerReader, ContainerService, MediaKind, StreamFormat, TagKey, TagValue};
use crate::format::{CodecTag, InputProfile, PcmFormat};
use crate::output::{OutputDevice, OutputService, PcmRegion};
use crate::position::StereoGain;

#[derive(Clone, Debug)]
pub(crate) struct FakeReader {
    pub format: StreamFormat,
    pub ticks: u64,
    tags: HashMap<TagKey, TagValue>,
}

impl FakeReader {
    pub fn stereo_mp3(ticks: u64) -> Self {
        Self {
            format: StreamFormat {
                kind: MediaKind::Audio,
                codec: CodecTag::Mp3,
                sample_rate: 44_100,
                channels: 2,
            },
            ticks,
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: TagKey, value: TagValue) -> Self {
        self.tags.insert(key, value);
        self
    }
}

impl ContainerReader for FakeReader {
    fn duration_ticks(&self) -> Result<u64> {
        Ok(self.ticks)
    }

    fn tag(&self, key: TagKey) -> Option<TagValue> {
        self.tags.get(&key).cloned()
    }

    fn stream_format(&self) -> Result<StreamFormat> {
        Ok(self.format)
    }
}

/// Hands out clones of one reader; `None` rejects every buffer.
#[derive(Clone, Debug)]
pub(crate) struct FakeContainer {
    pub reader: Option<FakeReader>,
}

impl FakeContainer {
    pub fn with(reader: FakeReader) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    pub fn rejecting() -> Self {
        Self { reader: None }
    }
}

impl ContainerService for FakeContainer {
    type Reader = FakeReader;

    fn open(&self, _bytes: Arc<Vec<u8>>) -> Result<FakeReader> {
        self.reader
            .clone()
            .ok_or_else(|| anyhow!("no recognizable container"))
    }
}

/// Emits every input byte `ratio` times.
#[derive(Debug)]
pub(crate) struct FixedRatioSession {
    pub ratio: usize,
    pub blocks_seen: usize,
}

impl FixedRatioSession {
    pub fn new(ratio: usize) -> Self {
        Self {
            ratio,
            blocks_seen: 0,
        }
    }
}

impl CodecSession for FixedRatioSession {
    fn convert_block(&mut self, block: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.blocks_seen += 1;
        for &b in block {
            out.extend(std::iter::repeat_n(b, self.ratio));
        }
        Ok(())
    }
}

/// Fails on the block with index `fail_at`.
#[derive(Debug)]
pub(crate) struct FailingSession {
    pub fail_at: usize,
    pub seen: usize,
}

impl CodecSession for FailingSession {
    fn convert_block(&mut self, _block: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.seen == self.fail_at {
            return Err(anyhow!("corrupt frame"));
        }
        self.seen += 1;
        out.extend_from_slice(&[0, 0, 0, 0]);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FakeCodec {
    pub ratio: usize,
    pub refuse: bool,
}

impl Default for FakeCodec {
    fn default() -> Self {
        Self {
            ratio: 1,
            refuse: false,
        }
    }
}

impl CodecService for FakeCodec {
    type Session = FixedRatioSession;

    fn open_session(&self, _input: &InputProfile, _output: &PcmFormat) -> Result<FixedRatioSession> {
        if self.refuse {
            return Err(anyhow!("conversion not available"));
        }
        Ok(FixedRatioSession::new(self.ratio))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DeviceEvent {
    Open,
    Prepare { start: usize, len: usize },
    Write,
    Unprepare,
    Reset,
    Pause,
    Resume,
    Close,
    Gain(StereoGain),
    DefaultGain(StereoGain),
}

#[derive(Debug, Default)]
struct FakeOutputState {
    events: Vec<DeviceEvent>,
    fail_open: bool,
    fail_write: bool,
    elapsed_frames: u64,
    drained: bool,
    open_devices: usize,
}

/// Output service recording every device call; clones share one log.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeOutput {
    state: Arc<Mutex<FakeOutputState>>,
}

impl FakeOutput {
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().unwrap().events.clear();
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn fail_write(&self, fail: bool) {
        self.state.lock().unwrap().fail_write = fail;
    }

    pub fn set_elapsed_frames(&self, frames: u64) {
        self.state.lock().unwrap().elapsed_frames = frames;
    }

    pub fn set_drained(&self, drained: bool) {
        self.state.lock().unwrap().drained = drained;
    }

    pub fn open_devices(&self) -> usize {
        self.state.lock().unwrap().open_devices
    }

    fn record(&self, event: DeviceEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl OutputService for FakeOutput {
    type Device = FakeDevice;

    fn open(&self, _format: &PcmFormat) -> Result<FakeDevice> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(anyhow!("no output device"));
        }
        state.events.push(DeviceEvent::Open);
        state.open_devices += 1;
        Ok(FakeDevice {
            output: self.clone(),
        })
    }

    fn set_default_gain(&self, gain: StereoGain) -> Result<()> {
        self.record(DeviceEvent::DefaultGain(gain));
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct FakeDevice {
    output: FakeOutput,
}

impl OutputDevice for FakeDevice {
    fn prepare(&mut self, region: PcmRegion) -> Result<()> {
        self.output.record(DeviceEvent::Prepare {
            start: region.start(),
            len: region.len(),
        });
        Ok(())
    }

    fn write(&mut self) -> Result<()> {
        if self.output.state.lock().unwrap().fail_write {
            return Err(anyhow!("device rejected buffer"));
        }
        self.output.record(DeviceEvent::Write);
        Ok(())
    }

    fn unprepare(&mut self) -> Result<()> {
        self.output.record(DeviceEvent::Unprepare);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.output.record(DeviceEvent::Reset);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.output.record(DeviceEvent::Pause);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.output.record(DeviceEvent::Resume);
        Ok(())
    }

    fn elapsed_frames(&self) -> Result<u64> {
        Ok(self.output.state.lock().unwrap().elapsed_frames)
    }

    fn set_gain(&mut self, gain: StereoGain) -> Result<()> {
        self.output.record(DeviceEvent::Gain(gain));
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.output.state.lock().unwrap().drained
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        let mut state = self.output.state.lock().unwrap();
        state.events.push(DeviceEvent::Close);
        state.open_devices -= 1;
    }
}
