//! Snapshot types
//!
//! A snapshot is the fully formatted, visibility-filtered view produced by one
//! poll. It is serialized once and dropped after broadcast.

use serde::Serialize;

use crate::error::SourceError;
use crate::source::{ChannelKind, SourceIdentity};

/// Latest data of one visible channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    /// Index into the source's channel descriptor
    pub index: usize,
    pub label: String,
    pub unit: String,
    pub kind: ChannelKind,
    /// Values that arrived since the previous snapshot, oldest first, or the
    /// single latest value when nothing new arrived
    pub values: Vec<f64>,
}

/// Latest data of one source with at least one visible channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub identity: SourceIdentity,
    pub nominal_rate: f64,
    /// Samples ever written to the source's buffer
    pub total_samples: u64,
    /// Samples written since the previous snapshot
    pub new_samples: u64,
    pub last_timestamp: Option<f64>,
    pub channels: Vec<ChannelSnapshot>,
}

impl SourceSnapshot {
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Find a channel by label
    pub fn channel(&self, label: &str) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|c| c.label == label)
    }
}

/// Plot sizing hints sent along with every snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewerConfig {
    /// Most values one channel carries per snapshot
    pub max_samples: usize,
    /// Period between snapshots in milliseconds, 0 when polled by hand
    pub timer_interval_ms: u64,
}

/// One tick's view of every live source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Monotonic tick counter
    pub tick_id: u64,
    /// Server wall-clock time in seconds since the Unix epoch
    pub t_server: f64,
    pub config: ViewerConfig,
    pub sources: Vec<SourceSnapshot>,
}

impl Snapshot {
    /// Total number of channel entries across all sources
    pub fn channel_count(&self) -> usize {
        self.sources.iter().map(|s| s.channels.len()).sum()
    }

    /// Find a source by name
    pub fn source(&self, name: &str) -> Option<&SourceSnapshot> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Per-source outcomes of one poll
#[derive(Debug, Default)]
pub struct PollReport {
    /// Failed pulls, one per failing source
    pub errors: Vec<SourceError>,
    /// Sources flagged dead during this poll
    pub dead: Vec<SourceIdentity>,
    /// Samples written across all sources
    pub samples_pulled: usize,
}

impl PollReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_dead(&self) -> bool {
        !self.dead.is_empty()
    }
}
