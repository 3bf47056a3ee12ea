//! Fixed-capacity circular history per channel.

/// The most recent `capacity` samples for each channel.
///
/// Writes go to `head` and wrap around; once full, each push overwrites the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct SignalHistory {
    channels: Vec<Vec<f64>>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl SignalHistory {
    pub fn new(channel_count: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: vec![vec![0.0; capacity]; channel_count],
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Append one reading per channel. Extra values are ignored and missing
    /// ones are stored as zero.
    pub fn push(&mut self, values: &[f64]) {
        for (i, channel) in self.channels.iter_mut().enumerate() {
            channel[self.head] = values.get(i).copied().unwrap_or(0.0);
        }
        self.head = (self.head + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Readings for one channel, oldest first.
    pub fn channel(&self, index: usize) -> Vec<f64> {
        let Some(channel) = self.channels.get(index) else {
            return Vec::new();
        };
        let start = (self.head + self.capacity - self.len) % self.capacity;
        (0..self.len)
            .map(|i| channel[(start + i) % self.capacity])
            .collect()
    }

    /// Most recent reading for each channel.
    pub fn latest(&self) -> Option<Vec<f64>> {
        if self.len == 0 {
            return None;
        }
        let last = (self.head + self.capacity - 1) % self.capacity;
        Some(self.channels.iter().map(|c| c[last]).collect())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
