//! Aggregator configuration

/// Configuration for snapshot assembly
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum values per channel carried in one snapshot
    pub max_samples_per_tick: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_samples_per_tick: 500,
        }
    }
}

impl AggregatorConfig {
    /// Set the per-channel value limit
    pub fn max_samples_per_tick(mut self, max: usize) -> Self {
        self.max_samples_per_tick = max.max(1);
        self
    }
}
