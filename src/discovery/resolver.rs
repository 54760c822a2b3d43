//! Discovery implementation

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::TransportError;
use crate::source::{SourceHandle, SourceIdentity};
use crate::transport::SourceTransport;

use super::config::DiscoveryConfig;

/// A candidate that was resolved but could not be turned into a handle
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateError {
    pub identity: SourceIdentity,
    pub error: TransportError,
}

/// Outcome of one discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Newly opened handles
    pub handles: Vec<SourceHandle>,
    /// Per-candidate failures; they never abort the batch
    pub errors: Vec<CandidateError>,
    /// Candidates dropped because their identity was already known
    pub duplicates: usize,
    /// Candidates returned by the transport
    pub resolved: usize,
}

impl DiscoveryReport {
    /// Identities of the newly opened handles
    pub fn identities(&self) -> Vec<SourceIdentity> {
        self.handles.iter().map(|h| h.identity().clone()).collect()
    }
}

/// Resolves sources through a transport and opens handles for new ones
#[derive(Clone)]
pub struct Discovery {
    transport: Arc<dyn SourceTransport>,
    config: DiscoveryConfig,
}

impl Discovery {
    /// Create discovery with default configuration
    pub fn new(transport: Arc<dyn SourceTransport>) -> Self {
        Self::with_config(transport, DiscoveryConfig::default())
    }

    /// Create discovery with custom configuration
    pub fn with_config(transport: Arc<dyn SourceTransport>, config: DiscoveryConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Resolve sources and open a handle for every identity not in `known`
    ///
    /// Blocks for up to `resolve_wait` inside the transport. Fails only when
    /// resolution itself fails; connection failures are reported per
    /// candidate in the returned report.
    pub fn resolve(&self, known: &HashSet<SourceIdentity>) -> Result<DiscoveryReport, TransportError> {
        let candidates = self.transport.resolve(self.config.resolve_wait)?;

        let mut report = DiscoveryReport {
            resolved: candidates.len(),
            ..DiscoveryReport::default()
        };
        let mut seen = known.clone();

        for description in candidates {
            let identity = description.identity();

            if seen.contains(&identity) {
                report.duplicates += 1;
                continue;
            }

            match SourceHandle::open(self.transport.as_ref(), &description, self.config.source.clone()) {
                Ok(handle) => {
                    tracing::info!(
                        source = %identity,
                        channels = handle.channel_count(),
                        rate = handle.nominal_rate(),
                        "Discovered new stream"
                    );
                    seen.insert(identity);
                    report.handles.push(handle);
                }
                Err(error) => {
                    tracing::warn!(source = %identity, error = %error, "Skipping stream");
                    report.errors.push(CandidateError { identity, error });
                }
            }
        }

        tracing::debug!(
            resolved = report.resolved,
            added = report.handles.len(),
            duplicates = report.duplicates,
            failed = report.errors.len(),
            "Discovery pass complete"
        );

        Ok(report)
    }
}
