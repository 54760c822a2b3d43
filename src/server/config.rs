//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Shortest tick period the broadcaster accepts
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Default WebSocket port
pub const DEFAULT_PORT: u16 = 8765;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent viewer sessions (0 = unlimited)
    pub max_connections: usize,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Run one discovery pass before accepting viewers
    pub discover_on_start: bool,

    /// Per-session queue of command replies awaiting the writer
    pub reply_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            discover_on_start: true,
            reply_capacity: 32,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Skip the startup discovery pass
    pub fn disable_startup_discovery(mut self) -> Self {
        self.discover_on_start = false;
        self
    }

    pub fn reply_capacity(mut self, capacity: usize) -> Self {
        self.reply_capacity = capacity.max(1);
        self
    }
}

/// Tick loop and fan-out configuration
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Period of the poll-and-broadcast tick
    pub tick_interval: Duration,

    /// Snapshots queued per session before the oldest are dropped
    pub frame_capacity: usize,

    /// Remove dead sources from the live set after each tick
    pub evict_dead: bool,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(2),
            frame_capacity: 16,
            evict_dead: true,
        }
    }
}

impl BroadcasterConfig {
    /// Set the tick period (at least [`MIN_TICK_INTERVAL`])
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    /// Set the per-session snapshot queue depth
    pub fn frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity.max(1);
        self
    }

    /// Keep dead sources in the live set
    pub fn keep_dead_sources(mut self) -> Self {
        self.evict_dead = false;
        self
    }
}
