//! Bounded queue of interleaved `f32` samples.
//!
//! Connects the resampling stages of a CPAL device that cannot run at the track rate:
//! - feeder thread (PCM region → `f32`) → queue
//! - resampler thread → queue
//! - CPAL callback drains the queue without blocking

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Thread-safe bounded queue for interleaved `f32` audio samples.
///
/// The `done` flag lives under the same mutex as the samples so close and drain never race.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Strategy for popping interleaved frames from the queue.
#[derive(Clone, Copy, Debug)]
pub enum PopStrategy {
    /// Block until exactly `frames` are available, or return `None` if closed before enough data.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then return up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Return immediately with up to `max_frames`, or `None` if currently empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio (2 s when the value is unusable).
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered frames right now.
    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Mark the queue finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns early (dropping the rest) once the queue is closed.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.done {
                return;
            }
            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Pop interleaved frames using the requested strategy.
    ///
    /// Returns `None` when the queue is closed and no data can satisfy the request.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.queue.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
                if g.queue.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.queue.len() < self.channels && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
                self.whole_frames(g.queue.len(), max_frames)
            }
            PopStrategy::NonBlocking { max_frames } => self.whole_frames(g.queue.len(), max_frames),
        };
        if take_samples == 0 {
            return None;
        }
        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    fn whole_frames(&self, queued_samples: usize, max_frames: usize) -> usize {
        (queued_samples / self.channels).min(max_frames) * self.channels
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
