//! Multi-source biosignal stream relay
//!
//! `mobi-relay` discovers live time-series sources (EEG, eye tracking,
//! physiological sensors, ...) through a pluggable transport, buffers the
//! most recent samples of each one, and pushes a merged, visibility-filtered
//! snapshot to every connected WebSocket viewer at a fixed tick rate.
//!
//! ```text
//!   SourceTransport ──► Discovery ──► Aggregator ──poll()──► Broadcaster ──► viewers
//!                                     (handles,                (tick loop,
//!                                      visibility)              fan-out)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mobi_relay::server::{RelayServer, ServerConfig};
//! use mobi_relay::transport::{MockTransport, SourceDescription};
//!
//! #[tokio::main]
//! async fn main() -> mobi_relay::Result<()> {
//!     let transport = Arc::new(MockTransport::new());
//!     transport.add_source(SourceDescription::new("dev-1", "EEGStream", "EEG", 8, 250.0));
//!
//!     let server = RelayServer::with_transport(ServerConfig::default(), transport);
//!     server.run().await
//! }
//! ```

pub mod aggregator;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod source;
pub mod stats;
pub mod transport;

pub use aggregator::{Aggregator, AggregatorConfig, AggregatorError, Snapshot};
pub use discovery::{Discovery, DiscoveryConfig};
pub use error::{Error, Result, SourceError, TransportError};
pub use protocol::{ServerMessage, ViewerCommand};
pub use server::{Broadcaster, BroadcasterConfig, RelayServer, ServerConfig};
pub use source::{SourceConfig, SourceHandle, SourceIdentity};
pub use transport::{SourceConnection, SourceDescription, SourceTransport};
