//! Aggregator error types

use crate::source::SourceIdentity;

/// Error type for aggregator operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    /// Visibility command for an unknown (source, channel) pair
    InvalidReference {
        identity: SourceIdentity,
        channel_index: usize,
    },
    /// A handle with this identity is already live
    DuplicateSource(SourceIdentity),
}

impl AggregatorError {
    /// Short machine-readable kind, as sent to viewers
    pub fn kind(&self) -> &'static str {
        match self {
            AggregatorError::InvalidReference { .. } => "invalid_reference",
            AggregatorError::DuplicateSource(_) => "duplicate_source",
        }
    }
}

impl std::fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregatorError::InvalidReference {
                identity,
                channel_index,
            } => write!(
                f,
                "Invalid reference: {} has no channel {}",
                identity, channel_index
            ),
            AggregatorError::DuplicateSource(identity) => {
                write!(f, "Source already live: {}", identity)
            }
        }
    }
}

impl std::error::Error for AggregatorError {}
