//! Source handle
//!
//! A handle wraps one open transport connection and owns the ring buffer the
//! connection is drained into. Only [`SourceHandle::pull`] mutates it; every
//! other accessor is read-only.

use std::fmt;

use crate::error::{PullError, SourceError, SourceErrorReason, TransportError};
use crate::transport::{SourceConnection, SourceDescription, SourceTransport};

use super::config::SourceConfig;
use super::identity::{ChannelDescriptor, SourceIdentity};
use super::ring::{BufferedSample, RingBuffer};

/// One connected source and its buffered samples
pub struct SourceHandle {
    identity: SourceIdentity,
    channels: Vec<ChannelDescriptor>,
    nominal_rate: f64,
    buffer: RingBuffer,
    connection: Box<dyn SourceConnection>,
    config: SourceConfig,
    /// Transient failures since the last successful pull
    consecutive_failures: u32,
    /// Set once the source is permanently gone
    dead: bool,
}

impl SourceHandle {
    /// Connect to a resolved source through `transport`
    pub fn open(
        transport: &dyn SourceTransport,
        description: &SourceDescription,
        config: SourceConfig,
    ) -> Result<Self, TransportError> {
        if description.channel_count == 0 {
            return Err(TransportError::InvalidChannelCount {
                name: description.name.clone(),
                count: description.channel_count,
            });
        }

        let connection = transport.connect(description)?;
        Ok(Self::new(description, connection, config))
    }

    /// Wrap an already open connection
    pub fn new(
        description: &SourceDescription,
        connection: Box<dyn SourceConnection>,
        config: SourceConfig,
    ) -> Self {
        let channels = ChannelDescriptor::from_metadata(
            description.channel_count,
            &description.channel_labels,
            &description.channel_units,
            &description.channel_types,
            &description.source_type,
        );

        Self {
            identity: description.identity(),
            buffer: RingBuffer::new(config.buffer_capacity, channels.len()),
            channels,
            nominal_rate: description.nominal_rate,
            connection,
            config,
            consecutive_failures: 0,
            dead: false,
        }
    }

    /// Drain pending samples from the transport into the ring buffer
    ///
    /// Returns the number of samples written. A transient error leaves the
    /// handle ready for the next call; a permanent one (or an exhausted retry
    /// budget) flags it dead.
    pub fn pull(&mut self) -> Result<usize, SourceError> {
        if self.dead {
            return Err(SourceError::Permanent {
                identity: self.identity.clone(),
                reason: SourceErrorReason::Closed,
            });
        }

        let samples = match self
            .connection
            .pull(self.config.pull_timeout, self.config.max_samples_per_pull)
        {
            Ok(samples) => samples,
            Err(PullError::Transient(msg)) => {
                return Err(self.transient_failure(SourceErrorReason::Transport(msg)));
            }
            Err(PullError::Permanent(msg)) => {
                self.dead = true;
                return Err(SourceError::Permanent {
                    identity: self.identity.clone(),
                    reason: SourceErrorReason::Transport(msg),
                });
            }
        };

        let expected = self.channels.len();
        let mut written = 0;
        let mut mismatch = None;

        for sample in samples {
            if sample.values.len() != expected {
                mismatch = Some(sample.values.len());
                continue;
            }
            self.buffer.push(sample.timestamp, &sample.values);
            written += 1;
        }

        if let Some(actual) = mismatch {
            return Err(self.transient_failure(SourceErrorReason::ChannelCountMismatch {
                expected,
                actual,
            }));
        }

        self.consecutive_failures = 0;
        Ok(written)
    }

    fn transient_failure(&mut self, reason: SourceErrorReason) -> SourceError {
        self.consecutive_failures += 1;

        if let Some(budget) = self.config.max_consecutive_failures {
            if self.consecutive_failures >= budget {
                self.dead = true;
                return SourceError::Permanent {
                    identity: self.identity.clone(),
                    reason: SourceErrorReason::RetryBudgetExhausted(self.consecutive_failures),
                };
            }
        }

        SourceError::Transient {
            identity: self.identity.clone(),
            reason,
        }
    }

    pub fn identity(&self) -> &SourceIdentity {
        &self.identity
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn nominal_rate(&self) -> f64 {
        self.nominal_rate
    }

    pub fn source_type(&self) -> &str {
        &self.identity.source_type
    }

    /// Samples ever written (monotonic)
    pub fn total_samples(&self) -> u64 {
        self.buffer.total_written()
    }

    /// Valid samples currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Up to `n` most recent samples in arrival order
    pub fn latest(&self, n: usize) -> Vec<BufferedSample> {
        self.buffer.latest(n)
    }

    /// Up to `n` most recent values of one channel in arrival order
    pub fn latest_channel(&self, channel: usize, n: usize) -> Vec<f64> {
        self.buffer.latest_channel(channel, n)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.buffer.last_timestamp()
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("identity", &self.identity)
            .field("channels", &self.channels.len())
            .field("total_samples", &self.total_samples())
            .field("dead", &self.dead)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_pull_into_ring() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-a", "A", "EEG", 2, 100.0);
        let source = transport.add_source(desc.clone());
        let config = SourceConfig::default().buffer_capacity(10);
        let mut handle = SourceHandle::open(&transport, &desc, config).unwrap();

        assert_eq!(handle.pull().unwrap(), 0);

        source.push_sequence(1, 15);
        assert_eq!(handle.pull().unwrap(), 15);
        assert_eq!(handle.total_samples(), 15);
        assert_eq!(handle.len(), 10);

        let latest: Vec<f64> = handle.latest(5).iter().map(|s| s.values[0]).collect();
        assert_eq!(latest, vec![11.0, 12.0, 13.0, 14.0, 15.0]);
        assert_eq!(handle.pull().unwrap(), 0);
    }

    #[test]
    fn test_repeated_pulls_keep_newest() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-b", "B", "Gaze", 1, 60.0);
        let source = transport.add_source(desc.clone());
        let config = SourceConfig::default()
            .buffer_capacity(10)
            .max_samples_per_pull(1);
        let mut handle = SourceHandle::open(&transport, &desc, config).unwrap();

        source.push_sequence(1, 15);
        for _ in 0..15 {
            assert_eq!(handle.pull().unwrap(), 1);
        }

        let latest: Vec<f64> = handle.latest(5).iter().map(|s| s.values[0]).collect();
        assert_eq!(latest, vec![11.0, 12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn test_transient_error_keeps_handle_alive() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-c", "C", "EEG", 1, 10.0);
        let source = transport.add_source(desc.clone());
        let mut handle = SourceHandle::open(&transport, &desc, SourceConfig::default()).unwrap();

        source.fail_next(PullError::Transient("timeout".into()));
        let err = handle.pull().unwrap_err();
        assert!(err.is_transient());
        assert!(!handle.is_dead());

        source.push(1.0, vec![42.0]);
        assert_eq!(handle.pull().unwrap(), 1);
        assert_eq!(handle.latest_channel(0, 1), vec![42.0]);
    }

    #[test]
    fn test_permanent_error_marks_dead() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-d", "D", "EEG", 1, 10.0);
        let source = transport.add_source(desc.clone());
        let mut handle = SourceHandle::open(&transport, &desc, SourceConfig::default()).unwrap();

        source.close();
        assert!(handle.pull().unwrap_err().is_permanent());
        assert!(handle.is_dead());

        let err = handle.pull().unwrap_err();
        assert_eq!(err.reason(), &SourceErrorReason::Closed);
    }

    #[test]
    fn test_retry_budget() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-e", "E", "EEG", 1, 10.0);
        let source = transport.add_source(desc.clone());
        let config = SourceConfig::default().retry_budget(3);
        let mut handle = SourceHandle::open(&transport, &desc, config).unwrap();

        source.set_always_transient(true);
        assert!(handle.pull().unwrap_err().is_transient());
        assert!(handle.pull().unwrap_err().is_transient());

        let err = handle.pull().unwrap_err();
        assert_eq!(err.reason(), &SourceErrorReason::RetryBudgetExhausted(3));
        assert!(handle.is_dead());
    }

    #[test]
    fn test_success_resets_budget() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-f", "F", "EEG", 1, 10.0);
        let source = transport.add_source(desc.clone());
        let config = SourceConfig::default().retry_budget(2);
        let mut handle = SourceHandle::open(&transport, &desc, config).unwrap();

        for _ in 0..5 {
            source.fail_next(PullError::Transient("blip".into()));
            assert!(handle.pull().unwrap_err().is_transient());
            assert!(handle.pull().is_ok());
        }
        assert!(!handle.is_dead());
    }

    #[test]
    fn test_channel_count_mismatch_skips_sample() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-g", "G", "EEG", 2, 10.0);
        let source = transport.add_source(desc.clone());
        let mut handle = SourceHandle::open(&transport, &desc, SourceConfig::default()).unwrap();

        source.push(1.0, vec![1.0, 1.0]);
        source.push(2.0, vec![2.0]);
        source.push(3.0, vec![3.0, 3.0]);

        let err = handle.pull().unwrap_err();
        assert_eq!(
            err.reason(),
            &SourceErrorReason::ChannelCountMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(handle.total_samples(), 2);
        assert!(!handle.is_dead());
    }

    #[test]
    fn test_zero_channels_rejected() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-h", "H", "Markers", 0, 0.0);
        transport.add_source(desc.clone());

        let result = SourceHandle::open(&transport, &desc, SourceConfig::default());
        assert!(matches!(
            result,
            Err(TransportError::InvalidChannelCount { count: 0, .. })
        ));
    }

    #[test]
    fn test_metadata_accessors() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("id-i", "I", "EEG", 2, 256.0).labels(["Fz", "Cz"]);
        transport.add_source(desc.clone());
        let handle = SourceHandle::open(&transport, &desc, SourceConfig::default()).unwrap();

        assert_eq!(handle.identity(), &desc.identity());
        assert_eq!(handle.channels()[1].label, "Cz");
        assert_eq!(handle.nominal_rate(), 256.0);
        assert_eq!(handle.capacity(), 1000);
        assert!(handle.is_empty());
    }
}
