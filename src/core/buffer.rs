//! Fixed-capacity sample accumulators.
//!
//! The frame buffer (renderer path) and the write buffer (disk path) share
//! this type. Each is filled sequentially, reports when it reaches capacity,
//! and is then drained whole by the ingestion loop.

use crate::core::sample::Sample;

/// Sequential accumulator that flips to "full" at a fixed capacity.
#[derive(Debug)]
pub struct SampleBuffer {
    slots: Vec<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create an empty buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Store a sample at the current index and advance it.
    ///
    /// Returns `true` when this push filled the buffer; the caller must
    /// `drain` it before pushing again.
    pub fn push(&mut self, sample: Sample) -> bool {
        debug_assert!(!self.is_full(), "push into a full buffer");
        self.slots.push(sample);
        self.is_full()
    }

    /// Take the contents and reset the index to zero.
    pub fn drain(&mut self) -> Vec<Sample> {
        std::mem::replace(&mut self.slots, Vec::with_capacity(self.capacity))
    }

    /// Current fill index.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
