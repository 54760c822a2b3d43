//! Stream discovery with deduplication
//!
//! Discovery asks the transport which sources are visible, drops every
//! candidate whose [`SourceIdentity`](crate::source::SourceIdentity) the
//! caller already knows, and opens a [`SourceHandle`](crate::source::SourceHandle)
//! for each survivor. It keeps no state between calls: the caller owns the
//! set of known identities and decides what to merge.

pub mod config;
pub mod resolver;

pub use config::DiscoveryConfig;
pub use resolver::{CandidateError, Discovery, DiscoveryReport};
