//! Statistics and metrics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Snapshots written to the socket
    pub snapshots_sent: u64,
    /// Snapshots skipped because the session fell behind
    pub snapshots_dropped: u64,
    /// Commands received and answered
    pub commands_handled: u64,
    /// Session duration
    pub duration: Duration,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of produced snapshots that reached this session
    pub fn delivery_ratio(&self) -> f64 {
        let produced = self.snapshots_sent + self.snapshots_dropped;
        if produced == 0 {
            1.0
        } else {
            self.snapshots_sent as f64 / produced as f64
        }
    }
}

/// Tick loop counters, updated lock-free from the tick task
#[derive(Debug, Default)]
pub struct TickCounters {
    ticks: AtomicU64,
    pull_errors: AtomicU64,
    evictions: AtomicU64,
    snapshots_published: AtomicU64,
    last_payload_bytes: AtomicU64,
    last_tick_micros: AtomicU64,
}

impl TickCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed tick
    pub fn record_tick(&self, pull_errors: usize, evictions: usize, elapsed: Duration) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.pull_errors
            .fetch_add(pull_errors as u64, Ordering::Relaxed);
        self.evictions.fetch_add(evictions as u64, Ordering::Relaxed);
        self.last_tick_micros
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record one snapshot handed to the fan-out channel
    pub fn record_publish(&self, payload_bytes: usize) {
        self.snapshots_published.fetch_add(1, Ordering::Relaxed);
        self.last_payload_bytes
            .store(payload_bytes as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> TickStats {
        TickStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            pull_errors: self.pull_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            snapshots_published: self.snapshots_published.load(Ordering::Relaxed),
            last_payload_bytes: self.last_payload_bytes.load(Ordering::Relaxed),
            last_tick_duration: Duration::from_micros(self.last_tick_micros.load(Ordering::Relaxed)),
        }
    }
}

/// Tick loop statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    /// Polls completed
    pub ticks: u64,
    /// Per-source pull failures across all ticks
    pub pull_errors: u64,
    /// Dead sources evicted
    pub evictions: u64,
    /// Snapshots serialized and fanned out
    pub snapshots_published: u64,
    /// Size of the latest serialized snapshot
    pub last_payload_bytes: u64,
    /// Wall time of the latest poll
    pub last_tick_duration: Duration,
}

/// Server-wide statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    /// Sessions ever accepted
    pub total_sessions: u64,
    /// Sessions currently connected
    pub active_sessions: u64,
    /// Live source handles
    pub live_sources: usize,
    /// Tick loop statistics
    pub ticks: TickStats,
    /// Time since the broadcaster was created
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new(started_at: Instant) -> Self {
        Self {
            total_sessions: 0,
            active_sessions: 0,
            live_sources: 0,
            ticks: TickStats::default(),
            uptime: started_at.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.snapshots_sent, 0);
        assert_eq!(stats.snapshots_dropped, 0);
        assert_eq!(stats.commands_handled, 0);
        assert_eq!(stats.delivery_ratio(), 1.0);
    }

    #[test]
    fn test_delivery_ratio() {
        let stats = SessionStats {
            snapshots_sent: 75,
            snapshots_dropped: 25,
            ..SessionStats::default()
        };

        assert_eq!(stats.delivery_ratio(), 0.75);
    }

    #[test]
    fn test_tick_counters() {
        let counters = TickCounters::new();
        counters.record_tick(2, 0, Duration::from_micros(150));
        counters.record_tick(1, 1, Duration::from_micros(90));
        counters.record_publish(512);

        let stats = counters.snapshot();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.pull_errors, 3);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.snapshots_published, 1);
        assert_eq!(stats.last_payload_bytes, 512);
        assert_eq!(stats.last_tick_duration, Duration::from_micros(90));
    }

    #[test]
    fn test_server_stats_new() {
        let stats = ServerStats::new(Instant::now());
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.live_sources, 0);
        assert_eq!(stats.ticks, TickStats::default());
    }
}
