//! Source transport interface
//!
//! The relay does not speak any stream-discovery protocol itself. A transport
//! (LSL, a test double, ...) implements [`SourceTransport`] to resolve the
//! sources visible on the network and open a [`SourceConnection`] to one of
//! them. Both traits are synchronous: transports are typically blocking C
//! libraries, and the relay calls `resolve`/`connect` on the blocking pool.

use std::time::Duration;

use crate::error::{PullError, TransportError};
use crate::source::SourceIdentity;

pub mod mock;

pub use mock::{MockSource, MockTransport};

/// A source as advertised by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescription {
    pub source_id: String,
    pub name: String,
    pub source_type: String,
    pub channel_count: usize,
    /// Channel labels; may be shorter than `channel_count` or contain blanks
    pub channel_labels: Vec<String>,
    pub channel_units: Vec<String>,
    pub channel_types: Vec<String>,
    /// Nominal sampling rate in Hz (0 for irregular streams)
    pub nominal_rate: f64,
}

impl SourceDescription {
    /// Create a description with no per-channel metadata
    pub fn new(
        source_id: impl Into<String>,
        name: impl Into<String>,
        source_type: impl Into<String>,
        channel_count: usize,
        nominal_rate: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            source_type: source_type.into(),
            channel_count,
            channel_labels: Vec::new(),
            channel_units: Vec::new(),
            channel_types: Vec::new(),
            nominal_rate,
        }
    }

    /// Set channel labels
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set channel units
    pub fn units<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_units = units.into_iter().map(Into::into).collect();
        self
    }

    /// Deduplication key of this source
    pub fn identity(&self) -> SourceIdentity {
        SourceIdentity::new(&self.source_id, &self.name, &self.source_type)
    }
}

/// One multi-channel sample as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub timestamp: f64,
    pub values: Vec<f64>,
}

impl RawSample {
    pub fn new(timestamp: f64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
}

/// Discovery and connection side of a transport
pub trait SourceTransport: Send + Sync + 'static {
    /// List the sources currently visible, waiting up to `wait`
    fn resolve(&self, wait: Duration) -> Result<Vec<SourceDescription>, TransportError>;

    /// Open a connection to one resolved source
    fn connect(
        &self,
        description: &SourceDescription,
    ) -> Result<Box<dyn SourceConnection>, TransportError>;
}

/// An open connection to one source
pub trait SourceConnection: Send {
    /// Pull up to `max_samples` pending samples, waiting at most `timeout`
    ///
    /// An empty vector means nothing was pending.
    fn pull(&mut self, timeout: Duration, max_samples: usize) -> Result<Vec<RawSample>, PullError>;
}
