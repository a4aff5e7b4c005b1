//! Codec conversion sessions.
//!
//! A session consumes fixed-size compressed blocks and appends whatever PCM the block
//! completes. The Symphonia-backed session reframes the raw MP3 byte stream itself:
//! - skip a leading ID3v2 tag
//! - lock onto frame sync (the first lock needs a second valid header behind the frame)
//! - decode each complete frame with Symphonia's MP3 decoder into interleaved `i16`

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_MP3, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use crate::format::{CodecTag, InputProfile, PcmFormat};
use crate::frame::{self, FrameHeader, HEADER_LEN};

/// Decode failures in more than this many consecutive frames abort the session.
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 3;

/// One open compressed → PCM conversion.
pub trait CodecSession {
    /// Convert one compressed block, appending produced PCM bytes to `out`.
    ///
    /// A block may complete zero, one or several codec frames.
    fn convert_block(&mut self, block: &[u8], out: &mut Vec<u8>) -> Result<()>;
}

/// Opens conversion sessions between a compressed profile and a PCM format.
pub trait CodecService {
    type Session: CodecSession;

    fn open_session(&self, input: &InputProfile, output: &PcmFormat) -> Result<Self::Session>;
}

/// MP3 → 16-bit PCM through Symphonia's MPEG audio decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaMp3Codec;

impl CodecService for SymphoniaMp3Codec {
    type Session = Mp3BlockSession;

    fn open_session(&self, input: &InputProfile, output: &PcmFormat) -> Result<Mp3BlockSession> {
        if input.codec != CodecTag::Mp3 {
            return Err(anyhow!("no decoder for {} input", input.codec));
        }
        if output.bits_per_sample != 16
            || output.sample_rate != input.sample_rate
            || output.channels != input.channels
        {
            return Err(anyhow!(
                "conversion {}ch@{}Hz -> {}ch@{}Hz/{}bit not possible",
                input.channels,
                input.sample_rate,
                output.channels,
                output.sample_rate,
                output.bits_per_sample
            ));
        }

        let channels = match input.channels {
            1 => Channels::FRONT_LEFT,
            2 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
            n => return Err(anyhow!("unsupported channel count {n}")),
        };
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(input.sample_rate)
            .with_channels(channels);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .context("open MP3 decoder")?;

        Ok(Mp3BlockSession {
            decoder,
            output: *output,
            pending: Vec::new(),
            stage: StreamStage::Start,
            synced: None,
            ts: 0,
            consecutive_errors: 0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamStage {
    /// Waiting for enough bytes to check for an ID3v2 tag.
    Start,
    /// Dropping the remaining bytes of a leading tag.
    SkipTag(usize),
    /// Looking for the first audio frame (may be a VBR info frame).
    FirstFrame,
    Frames,
}

/// Block-fed MP3 decoding session.
pub struct Mp3BlockSession {
    decoder: Box<dyn Decoder>,
    output: PcmFormat,
    pending: Vec<u8>,
    stage: StreamStage,
    /// Header of the last frame when locked onto the stream.
    synced: Option<FrameHeader>,
    /// Timestamp of the next packet, in samples per channel.
    ts: u64,
    consecutive_errors: usize,
}

impl CodecSession for Mp3BlockSession {
    fn convert_block(&mut self, block: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending.extend_from_slice(block);
        self.skip_leading_tag();
        while let Some((header, frame)) = self.next_frame() {
            if self.stage == StreamStage::FirstFrame {
                self.stage = StreamStage::Frames;
                if frame::is_vbr_info_frame(&header, &frame) {
                    tracing::debug!("skipping VBR info frame");
                    continue;
                }
            }
            self.decode_frame(&header, &frame, out)?;
        }
        Ok(())
    }
}

impl Mp3BlockSession {
    fn skip_leading_tag(&mut self) {
        if self.stage == StreamStage::Start {
            if self.pending.len() < 10 {
                return;
            }
            self.stage = match frame::id3v2_len(&self.pending) {
                Some(len) => StreamStage::SkipTag(len),
                None => StreamStage::FirstFrame,
            };
        }
        if let StreamStage::SkipTag(remaining) = self.stage {
            let n = remaining.min(self.pending.len());
            self.pending.drain(..n);
            self.stage = if n == remaining {
                StreamStage::FirstFrame
            } else {
                StreamStage::SkipTag(remaining - n)
            };
        }
    }

    /// Split the next complete frame off the pending window.
    fn next_frame(&mut self) -> Option<(FrameHeader, Vec<u8>)> {
        if matches!(self.stage, StreamStage::Start | StreamStage::SkipTag(_)) {
            return None;
        }
        loop {
            let Some(offset) = frame::find_sync(&self.pending) else {
                // keep a trailing 0xFF that may start the next sync word
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let drop = self.pending.len() - keep;
                self.drop_bytes(drop);
                return None;
            };
            self.drop_bytes(offset);
            if self.pending.len() < HEADER_LEN {
                return None;
            }

            let Some(header) = FrameHeader::parse(&self.pending) else {
                self.drop_bytes(1);
                continue;
            };
            let len = header.frame_len();

            match self.synced {
                Some(prev) if prev.is_compatible(&header) => {
                    if self.pending.len() < len {
                        return None;
                    }
                }
                _ => {
                    if self.pending.len() < len + HEADER_LEN {
                        return None;
                    }
                    let follows = FrameHeader::parse(&self.pending[len..])
                        .is_some_and(|next| next.is_compatible(&header));
                    if !follows {
                        self.drop_bytes(1);
                        continue;
                    }
                    if self.synced.is_some() {
                        tracing::warn!("MP3 stream resynchronised");
                    }
                }
            }

            self.synced = Some(header);
            let frame: Vec<u8> = self.pending.drain(..len).collect();
            return Some((header, frame));
        }
    }

    fn drop_bytes(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if self.synced.take().is_some() {
            tracing::debug!(skipped = n, "lost MP3 frame sync");
        }
        self.pending.drain(..n);
    }

    fn decode_frame(&mut self, header: &FrameHeader, frame: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let dur = header.samples_per_frame() as u64;
        let packet = Packet::new_from_slice(0, self.ts, dur, frame);
        self.ts += dur;

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                self.consecutive_errors += 1;
                tracing::warn!(reason, ts = packet.ts(), "skipping undecodable MP3 frame");
                if self.consecutive_errors > MAX_CONSECUTIVE_DECODE_ERRORS {
                    return Err(anyhow!(
                        "{} consecutive MP3 frames failed to decode",
                        self.consecutive_errors
                    ));
                }
                return Ok(());
            }
            Err(e) => return Err(e).context("decode MP3 frame"),
        };
        self.consecutive_errors = 0;

        let spec = *decoded.spec();
        if spec.rate != self.output.sample_rate
            || spec.channels.count() != usize::from(self.output.channels)
        {
            return Err(anyhow!(
                "frame decoded as {}ch@{}Hz, session expects {}ch@{}Hz",
                spec.channels.count(),
                spec.rate,
                self.output.channels,
                self.output.sample_rate
            ));
        }

        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        out.reserve(samples.samples().len() * 2);
        for s in samples.samples() {
            out.extend_from_slice(&s.to_le_bytes());
        }
        Ok(())
    }
}

impl Drop for Mp3BlockSession {
    fn drop(&mut self) {
        tracing::debug!(
            decoded_samples = self.ts,
            leftover_bytes = self.pending.len(),
            "MP3 session closed"
        );
    }
}
