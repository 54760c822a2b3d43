//! Viewer session state machine
//!
//! Tracks one viewer connection from TCP accept to close.

use std::net::SocketAddr;
use std::time::Instant;

use crate::stats::SessionStats;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// TCP connected, WebSocket handshake not started
    Connected,
    /// WebSocket handshake in progress
    Handshaking,
    /// Receiving snapshots and sending commands
    Active,
    /// Session is closing
    Closing,
    /// Session closed
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time when the WebSocket handshake completed
    pub active_at: Option<Instant>,

    /// Snapshots written to the socket
    pub snapshots_sent: u64,

    /// Snapshots skipped because this session fell behind
    pub snapshots_dropped: u64,

    /// Commands answered
    pub commands_handled: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connected,
            connected_at: Instant::now(),
            active_at: None,
            snapshots_sent: 0,
            snapshots_dropped: 0,
            commands_handled: 0,
        }
    }

    /// Transition to handshaking phase
    pub fn start_handshake(&mut self) {
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Handshaking;
        }
    }

    /// Complete handshake
    pub fn activate(&mut self) {
        if self.phase == SessionPhase::Handshaking {
            self.phase = SessionPhase::Active;
            self.active_at = Some(Instant::now());
        }
    }

    pub fn on_snapshot_sent(&mut self) {
        self.snapshots_sent += 1;
    }

    pub fn on_lagged(&mut self, skipped: u64) {
        self.snapshots_dropped += skipped;
    }

    pub fn on_command(&mut self) {
        self.commands_handled += 1;
    }

    /// Start closing the session
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closing;
        }
    }

    /// Mark the session closed
    pub fn closed(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Current statistics
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            snapshots_sent: self.snapshots_sent,
            snapshots_dropped: self.snapshots_dropped,
            commands_handled: self.commands_handled,
            duration: self.duration(),
        }
    }
}
