//! Session context
//!
//! Read-only description of a connected viewer, registered with the
//! broadcaster for the lifetime of the session.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Registered viewer session
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// When the session was registered
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            session_id,
            peer_addr,
            connected_at: Instant::now(),
        }
    }

    /// Time since registration
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
