//! Thread-safe audio sample queue.
//!
//! The one structure in the crate that two contexts touch concurrently: the
//! network side pushes decoded, resampled samples; the audio-render side pulls
//! one sample per channel per frame. The reader never blocks — underflow
//! yields silence.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Unbounded FIFO of single-precision samples, shared between the network
/// producer context and the audio-render consumer context.
#[derive(Clone, Default)]
pub struct SampleQueue {
    inner: Arc<Mutex<VecDeque<f32>>>,
}

impl SampleQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a block of samples. Producer side.
    pub fn push_slice(&self, samples: &[f32]) {
        let mut q = self.inner.lock();
        q.extend(samples.iter().copied());
    }

    /// Pop a single sample, or `None` on underflow.
    pub fn pop(&self) -> Option<f32> {
        self.inner.lock().pop_front()
    }

    /// Fill an interleaved output buffer: one queued sample per frame,
    /// duplicated across `channels`; silence once the queue runs dry.
    pub fn fill(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut q = self.inner.lock();
        for frame in out.chunks_mut(channels) {
            let sample = q.pop_front().unwrap_or(0.0);
            for slot in frame {
                *slot = sample;
            }
        }
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is drained.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop all queued samples.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
