//! Error types
//!
//! Errors are split by the layer that produces them:
//!
//! - [`TransportError`] / [`PullError`]: failures reported by the external
//!   source transport (resolve, connect, pull)
//! - [`SourceError`]: a classified pull failure of one source handle
//! - [`Error`]: crate-level failures of the relay server itself
//!
//! Per-source and per-session failures never abort a tick; they are collected
//! into reports and logged. Only [`Error::TickLoop`] is fatal.

use std::fmt;
use std::io;

use tokio_tungstenite::tungstenite;

use crate::aggregator::AggregatorError;
use crate::source::SourceIdentity;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or listener I/O error
    Io(io::Error),
    /// WebSocket protocol error
    WebSocket(tungstenite::Error),
    /// Snapshot serialization or command parsing error
    Json(serde_json::Error),
    /// Command rejected by the aggregator
    Aggregator(AggregatorError),
    /// Source transport failure outside of a single candidate
    Transport(TransportError),
    /// Operation did not complete in time
    Timeout,
    /// The tick loop could not be scheduled or died
    TickLoop(String),
    /// The broadcaster is shutting down
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Aggregator(e) => write!(f, "{}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::TickLoop(msg) => write!(f, "Tick loop failed: {}", msg),
            Error::Shutdown => write!(f, "Broadcaster is shutting down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Aggregator(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<AggregatorError> for Error {
    fn from(e: AggregatorError) -> Self {
        Error::Aggregator(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

/// Failure reported by the transport while resolving or connecting
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Network resolution failed as a whole
    ResolveFailed(String),
    /// Connecting to one source failed (e.g. connection refused)
    ConnectFailed {
        /// Name of the source that could not be opened
        name: String,
        /// Transport-provided reason
        reason: String,
    },
    /// Source advertises an unusable channel count
    InvalidChannelCount {
        /// Name of the offending source
        name: String,
        /// Advertised channel count
        count: usize,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ResolveFailed(reason) => {
                write!(f, "Stream resolution failed: {}", reason)
            }
            TransportError::ConnectFailed { name, reason } => {
                write!(f, "Failed to connect to {}: {}", name, reason)
            }
            TransportError::InvalidChannelCount { name, count } => {
                write!(f, "Invalid channel count for {}: {}", name, count)
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Failure reported by the transport for a single pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullError {
    /// Retryable; the next pull may succeed
    Transient(String),
    /// The source is gone for good
    Permanent(String),
}

impl fmt::Display for PullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullError::Transient(msg) => write!(f, "transient pull error: {}", msg),
            PullError::Permanent(msg) => write!(f, "source lost: {}", msg),
        }
    }
}

impl std::error::Error for PullError {}

/// Why a source pull failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceErrorReason {
    /// Error text reported by the transport
    Transport(String),
    /// A sample arrived with the wrong number of values
    ChannelCountMismatch { expected: usize, actual: usize },
    /// Too many transient failures in a row
    RetryBudgetExhausted(u32),
    /// Pull attempted on a handle already flagged dead
    Closed,
}

impl fmt::Display for SourceErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceErrorReason::Transport(msg) => write!(f, "{}", msg),
            SourceErrorReason::ChannelCountMismatch { expected, actual } => write!(
                f,
                "sample has {} values, expected {} channels",
                actual, expected
            ),
            SourceErrorReason::RetryBudgetExhausted(n) => {
                write!(f, "{} consecutive transient failures", n)
            }
            SourceErrorReason::Closed => write!(f, "source handle is closed"),
        }
    }
}

/// Classified pull failure of one source handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Retryable; the handle stays alive
    Transient {
        identity: SourceIdentity,
        reason: SourceErrorReason,
    },
    /// The handle is flagged dead and will be evicted
    Permanent {
        identity: SourceIdentity,
        reason: SourceErrorReason,
    },
}

impl SourceError {
    /// Identity of the failing source
    pub fn identity(&self) -> &SourceIdentity {
        match self {
            SourceError::Transient { identity, .. } | SourceError::Permanent { identity, .. } => {
                identity
            }
        }
    }

    /// Failure reason
    pub fn reason(&self) -> &SourceErrorReason {
        match self {
            SourceError::Transient { reason, .. } | SourceError::Permanent { reason, .. } => {
                reason
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient { .. })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, SourceError::Permanent { .. })
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transient { identity, reason } => {
                write!(f, "Transient error on {}: {}", identity, reason)
            }
            SourceError::Permanent { identity, reason } => {
                write!(f, "Source {} lost: {}", identity, reason)
            }
        }
    }
}

impl std::error::Error for SourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_classification() {
        let identity = SourceIdentity::new("abc", "EEGStream", "EEG");
        let err = SourceError::Transient {
            identity: identity.clone(),
            reason: SourceErrorReason::Transport("timeout".into()),
        };

        assert!(err.is_transient());
        assert!(!err.is_permanent());
        assert_eq!(err.identity(), &identity);
        assert_eq!(err.to_string(), "Transient error on EEGStream (EEG, abc): timeout");
    }

    #[test]
    fn test_mismatch_display() {
        let reason = SourceErrorReason::ChannelCountMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(reason.to_string(), "sample has 3 values, expected 4 channels");
    }

    #[test]
    fn test_error_from_aggregator() {
        let identity = SourceIdentity::new("abc", "EEGStream", "EEG");
        let err: Error = AggregatorError::InvalidReference {
            identity,
            channel_index: 9,
        }
        .into();

        assert!(matches!(err, Error::Aggregator(_)));
        assert!(err.to_string().contains("channel 9"));
    }
}
