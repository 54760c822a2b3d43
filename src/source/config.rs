//! Source handle configuration

use std::time::Duration;

/// Configuration applied to every source handle
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Ring buffer depth in samples
    pub buffer_capacity: usize,

    /// Maximum time one pull may wait on the transport
    pub pull_timeout: Duration,

    /// Maximum samples drained per pull
    pub max_samples_per_pull: usize,

    /// Consecutive transient failures before the handle is flagged dead
    /// (`None` = retry forever)
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            pull_timeout: Duration::ZERO,
            max_samples_per_pull: 1024,
            max_consecutive_failures: None,
        }
    }
}

impl SourceConfig {
    /// Set ring buffer depth
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Set pull timeout
    pub fn pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Set the per-pull sample limit
    pub fn max_samples_per_pull(mut self, max: usize) -> Self {
        self.max_samples_per_pull = max.max(1);
        self
    }

    /// Flag handles dead after `failures` consecutive transient errors
    pub fn retry_budget(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = Some(failures.max(1));
        self
    }
}
