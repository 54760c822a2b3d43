//! Fixed-capacity sample ring buffer
//!
//! Stores the most recent `capacity` multi-channel samples of one source.
//! Values are kept in a single flat allocation (`capacity * channels`), so a
//! write is a slice copy and never reallocates. Once full, the oldest sample
//! is overwritten.

/// One buffered sample, as returned by [`RingBuffer::latest`]
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedSample {
    /// Transport timestamp (seconds)
    pub timestamp: f64,
    /// One value per channel
    pub values: Vec<f64>,
}

/// Circular sample storage for one source
#[derive(Debug)]
pub struct RingBuffer {
    /// Maximum number of samples kept
    capacity: usize,
    /// Values per sample
    channels: usize,
    /// Flat value storage, sample-major
    values: Vec<f64>,
    /// One timestamp per slot
    timestamps: Vec<f64>,
    /// Slot the next write goes to
    cursor: usize,
    /// Samples ever written (monotonic)
    total: u64,
}

impl RingBuffer {
    /// Create a buffer holding `capacity` samples of `channels` values
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize, channels: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            channels,
            values: vec![0.0; capacity * channels],
            timestamps: vec![0.0; capacity],
            cursor: 0,
            total: 0,
        }
    }

    /// Write one sample at the cursor
    ///
    /// `values` must hold exactly `channels` entries; the caller validates.
    pub fn push(&mut self, timestamp: f64, values: &[f64]) {
        debug_assert_eq!(values.len(), self.channels);

        let start = self.cursor * self.channels;
        self.values[start..start + self.channels].copy_from_slice(values);
        self.timestamps[self.cursor] = timestamp;

        self.cursor = (self.cursor + 1) % self.capacity;
        self.total += 1;
    }

    /// Number of valid samples: `min(total, capacity)`
    pub fn len(&self) -> usize {
        self.total.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples ever written
    pub fn total_written(&self) -> u64 {
        self.total
    }

    /// Slot index of the sample `back` positions before the newest (0 = newest)
    fn slot(&self, back: usize) -> usize {
        (self.cursor + self.capacity - 1 - back) % self.capacity
    }

    /// Up to `n` most recent samples, oldest first
    pub fn latest(&self, n: usize) -> Vec<BufferedSample> {
        let count = n.min(self.len());

        (0..count)
            .rev()
            .map(|back| {
                let slot = self.slot(back);
                let start = slot * self.channels;
                BufferedSample {
                    timestamp: self.timestamps[slot],
                    values: self.values[start..start + self.channels].to_vec(),
                }
            })
            .collect()
    }

    /// Up to `n` most recent values of one channel, oldest first
    ///
    /// Returns an empty vector for an out-of-range channel.
    pub fn latest_channel(&self, channel: usize, n: usize) -> Vec<f64> {
        if channel >= self.channels {
            return Vec::new();
        }

        let count = n.min(self.len());
        (0..count)
            .rev()
            .map(|back| self.values[self.slot(back) * self.channels + channel])
            .collect()
    }

    /// Timestamp of the newest sample
    pub fn last_timestamp(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.timestamps[self.slot(0)])
        }
    }
}
