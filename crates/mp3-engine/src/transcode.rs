//! Up-front block transcoding.
//!
//! Reads the compressed stream in fixed-size blocks, converts each full block through a
//! [`CodecSession`] and appends the PCM to one contiguous buffer. A short read ends the loop
//! and the partial block is not converted.

use std::io::{ErrorKind, Read};

use crate::codec::CodecSession;
use crate::error::{EngineError, EngineResult};
use crate::format::PcmFormat;

/// Reusable block and conversion buffers owned by one engine.
#[derive(Debug, Default)]
pub struct TranscodeScratch {
    block: Vec<u8>,
    converted: Vec<u8>,
}

impl TranscodeScratch {
    fn prepare(&mut self, block_size: usize) -> EngineResult<()> {
        self.block.clear();
        self.block
            .try_reserve_exact(block_size)
            .map_err(|_| EngineError::OutOfMemory {
                what: "compressed block",
                bytes: block_size,
            })?;
        self.block.resize(block_size, 0);
        self.converted.clear();
        Ok(())
    }
}

/// Upper bound of the PCM size for a track: whole seconds rounded up.
pub fn pcm_capacity(duration_secs: f64, format: &PcmFormat) -> usize {
    let secs = duration_secs.max(0.0).ceil();
    (secs * format.bytes_per_second() as f64) as usize
}

/// Outcome of one transcode run.
#[derive(Debug)]
pub struct Transcoded {
    pub pcm: Vec<u8>,
    pub blocks: usize,
    /// Bytes the codec produced past `capacity` and that were dropped.
    pub overflow_bytes: usize,
}

/// Transcode `source` block by block into a PCM buffer of at most `capacity` bytes.
///
/// The returned buffer is truncated to whole PCM frames of `format`.
pub fn transcode<R, S>(
    mut source: R,
    session: &mut S,
    scratch: &mut TranscodeScratch,
    block_size: usize,
    capacity: usize,
    format: &PcmFormat,
) -> EngineResult<Transcoded>
where
    R: Read,
    S: CodecSession,
{
    if block_size == 0 {
        return Err(EngineError::Input("block size must be non-zero".into()));
    }
    scratch.prepare(block_size)?;

    let mut pcm = Vec::new();
    pcm.try_reserve_exact(capacity)
        .map_err(|_| EngineError::OutOfMemory {
            what: "pcm buffer",
            bytes: capacity,
        })?;

    let mut blocks = 0usize;
    let mut overflow_bytes = 0usize;
    loop {
        let filled = read_block(&mut source, &mut scratch.block)
            .map_err(|e| EngineError::Input(format!("read compressed block: {e}")))?;
        if filled != block_size {
            tracing::debug!(filled, block_size, "short block, stopping");
            break;
        }

        scratch.converted.clear();
        session
            .convert_block(&scratch.block, &mut scratch.converted)
            .map_err(|e| EngineError::codec(e.context(format!("convert block {blocks}"))))?;
        blocks += 1;

        let room = capacity - pcm.len();
        let take = scratch.converted.len().min(room);
        pcm.extend_from_slice(&scratch.converted[..take]);
        overflow_bytes += scratch.converted.len() - take;
    }

    let align = format.block_align().max(1);
    pcm.truncate(pcm.len() - pcm.len() % align);
    if overflow_bytes > 0 {
        tracing::warn!(overflow_bytes, capacity, "decoded PCM exceeded allocation; tail dropped");
    }
    tracing::debug!(blocks, pcm_bytes = pcm.len(), capacity, "transcode finished");

    Ok(Transcoded {
        pcm,
        blocks,
        overflow_bytes,
    })
}

/// Fill `buf` from `source`, returning how many bytes were read before end of input.
fn read_block<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
