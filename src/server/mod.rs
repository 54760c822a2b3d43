//! WebSocket relay server
//!
//! [`RelayServer`] accepts viewer connections and owns the shared
//! [`Broadcaster`], which runs the tick loop and fans every snapshot out to
//! the connected sessions.

pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod listener;

pub use broadcaster::{Broadcaster, DiscoverOutcome, SnapshotFrame, TickOutcome};
pub use config::{BroadcasterConfig, ServerConfig};
pub use connection::Connection;
pub use listener::RelayServer;
