//! Discovery configuration

use std::time::Duration;

use crate::source::SourceConfig;

/// Configuration for stream discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long the transport may wait for sources to answer
    pub resolve_wait: Duration,

    /// Configuration for every handle discovery creates
    pub source: SourceConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            resolve_wait: Duration::from_secs(1),
            source: SourceConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Set the resolve wait time
    pub fn resolve_wait(mut self, wait: Duration) -> Self {
        self.resolve_wait = wait;
        self
    }

    /// Set the handle configuration
    pub fn source(mut self, config: SourceConfig) -> Self {
        self.source = config;
        self
    }
}
