//! Tick loop and snapshot fan-out
//!
//! The broadcaster owns the aggregator behind a single async mutex. Every
//! tick it polls, serializes the resulting snapshot once, and publishes the
//! bytes on a bounded broadcast channel. Each viewer session holds its own
//! receiver, so a slow viewer only ever loses its own oldest snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::aggregator::{Aggregator, AggregatorError};
use crate::discovery::Discovery;
use crate::error::{Error, Result, SourceError, TransportError};
use crate::protocol::message::{DISCOVERY_FAILED, SHUTTING_DOWN};
use crate::protocol::{ServerMessage, ViewerCommand};
use crate::session::SessionContext;
use crate::source::SourceIdentity;
use crate::stats::{ServerStats, TickCounters};

use super::config::{BroadcasterConfig, MIN_TICK_INTERVAL};

/// One serialized snapshot, shared by every receiving session
#[derive(Debug, Clone)]
pub struct SnapshotFrame {
    pub tick_id: u64,
    /// JSON text of a `snapshot` message
    pub payload: Bytes,
}

/// What one tick did
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub tick_id: u64,
    /// Sources present in the snapshot
    pub sources: usize,
    /// Channel entries present in the snapshot
    pub channels: usize,
    /// Live sources after eviction
    pub live_sources: usize,
    /// Pull failures of this tick
    pub errors: Vec<SourceError>,
    /// Sources evicted after this tick
    pub evicted: Vec<SourceIdentity>,
    /// Sessions the snapshot was handed to
    pub delivered_to: usize,
}

/// Result of one discovery request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverOutcome {
    /// Sources added by this request
    pub added: usize,
    /// Live sources after the request
    pub total: usize,
}

/// Shared relay state: aggregator, discovery, and connected sessions
pub struct Broadcaster {
    aggregator: Arc<Mutex<Aggregator>>,
    discovery: Discovery,
    config: BroadcasterConfig,
    tx: broadcast::Sender<SnapshotFrame>,
    sessions: RwLock<HashMap<u64, SessionContext>>,
    total_sessions: AtomicU64,
    counters: TickCounters,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl Broadcaster {
    /// Create a broadcaster with an empty aggregator and default configuration
    pub fn new(discovery: Discovery) -> Self {
        Self::with_config(discovery, Aggregator::new(), BroadcasterConfig::default())
    }

    /// Create a broadcaster around an existing aggregator
    pub fn with_config(
        discovery: Discovery,
        aggregator: Aggregator,
        config: BroadcasterConfig,
    ) -> Self {
        let (tx, _) = broadcast::channel(config.frame_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            aggregator: Arc::new(Mutex::new(aggregator)),
            discovery,
            config,
            tx,
            sessions: RwLock::new(HashMap::new()),
            total_sessions: AtomicU64::new(0),
            counters: TickCounters::new(),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// The aggregator lock, for inspection
    pub fn aggregator(&self) -> &Mutex<Aggregator> {
        &self.aggregator
    }

    /// Poll every source and publish the snapshot
    ///
    /// Transport pulls may block, so the poll runs on the blocking pool while
    /// holding the aggregator lock; other tasks keep running meanwhile. The
    /// snapshot is serialized only when at least one session is listening.
    /// Snapshots are published in tick order.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let started = Instant::now();
        let evict_dead = self.config.evict_dead;
        let mut aggregator = Arc::clone(&self.aggregator).lock_owned().await;

        let (mut snapshot, report, evicted, live_sources) = tokio::task::spawn_blocking(move || {
            let (snapshot, report) = aggregator.poll();
            let evicted = if evict_dead && report.has_dead() {
                aggregator.evict_dead()
            } else {
                Vec::new()
            };
            (snapshot, report, evicted, aggregator.source_count())
        })
        .await
        .map_err(|e| Error::TickLoop(format!("poll task failed: {}", e)))?;

        self.counters
            .record_tick(report.errors.len(), evicted.len(), started.elapsed());

        let mut outcome = TickOutcome {
            tick_id: snapshot.tick_id,
            sources: snapshot.sources.len(),
            channels: snapshot.channel_count(),
            live_sources,
            errors: report.errors,
            evicted,
            delivered_to: 0,
        };

        if self.tx.receiver_count() == 0 {
            return Ok(outcome);
        }

        snapshot.config.timer_interval_ms = self.tick_interval().as_millis() as u64;

        match ServerMessage::Snapshot(snapshot).to_json() {
            Ok(json) => {
                let payload = Bytes::from(json);
                self.counters.record_publish(payload.len());

                // Err only when every receiver went away since the check above
                outcome.delivered_to = self
                    .tx
                    .send(SnapshotFrame {
                        tick_id: outcome.tick_id,
                        payload,
                    })
                    .unwrap_or(0);
            }
            Err(e) => {
                tracing::error!(tick_id = outcome.tick_id, error = %e, "Failed to serialize snapshot");
            }
        }

        Ok(outcome)
    }

    /// Effective tick period, never below [`MIN_TICK_INTERVAL`]
    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval.max(MIN_TICK_INTERVAL)
    }

    /// Spawn the periodic tick task
    ///
    /// The task exits once [`shutdown`](Self::shutdown) is called, or after
    /// a tick fails to run. A tick that overruns its period delays the next
    /// one instead of bursting.
    pub fn spawn_tick_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let period = broadcaster.tick_interval();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::debug!(interval = ?period, "Tick loop started");

            while !*shutdown.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = broadcaster.tick().await {
                            tracing::error!(error = %e, "Tick failed, stopping tick loop");
                            break;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Tick loop stopped");
        })
    }

    /// Resolve sources and merge the new ones
    ///
    /// Resolution runs on the blocking pool without holding the aggregator
    /// lock, so ticks keep flowing while the transport waits. Identities
    /// added concurrently are dropped again by the aggregator.
    pub async fn discover(&self) -> Result<DiscoverOutcome> {
        if self.is_shutting_down() {
            return Err(Error::Shutdown);
        }

        let known = self.aggregator.lock().await.known_identities();
        let discovery = self.discovery.clone();

        let report = tokio::task::spawn_blocking(move || discovery.resolve(&known))
            .await
            .map_err(|e| TransportError::ResolveFailed(format!("discovery task failed: {}", e)))??;

        let mut aggregator = self.aggregator.lock().await;
        let added = aggregator.add(report.handles);
        let total = aggregator.source_count();

        tracing::info!(
            added = added,
            total = total,
            failed = report.errors.len(),
            "Discovery finished"
        );

        Ok(DiscoverOutcome { added, total })
    }

    /// Show or hide one channel, effective from the next tick
    pub async fn set_visibility(
        &self,
        identity: &SourceIdentity,
        channel_index: usize,
        visible: bool,
    ) -> std::result::Result<(), AggregatorError> {
        self.aggregator
            .lock()
            .await
            .set_visibility(identity, channel_index, visible)
    }

    /// Apply a viewer command and build the reply for the issuing session
    pub async fn handle_command(&self, session_id: u64, command: ViewerCommand) -> ServerMessage {
        tracing::debug!(session_id = session_id, command = command.name(), "Command received");

        match command {
            ViewerCommand::DiscoverStreams => match self.discover().await {
                Ok(outcome) => ServerMessage::DiscoverResult {
                    count: outcome.added,
                    total_streams: outcome.total,
                },
                Err(Error::Shutdown) => ServerMessage::error(SHUTTING_DOWN, Error::Shutdown.to_string()),
                Err(e) => {
                    tracing::warn!(session_id = session_id, error = %e, "Discovery failed");
                    ServerMessage::error(DISCOVERY_FAILED, e.to_string())
                }
            },
            ViewerCommand::SetVisibility {
                ref identity,
                channel_index,
                visible,
            } => match self.set_visibility(identity, channel_index, visible).await {
                Ok(()) => ServerMessage::ack(&command),
                Err(e) => ServerMessage::error(e.kind(), e.to_string()),
            },
        }
    }

    /// Register a session and return its snapshot receiver
    ///
    /// The receiver only sees snapshots published after this call.
    pub async fn register_session(&self, context: SessionContext) -> broadcast::Receiver<SnapshotFrame> {
        let rx = self.tx.subscribe();
        let session_id = context.session_id;
        let peer = context.peer_addr;

        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, context);
        self.total_sessions.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            session_id = session_id,
            peer = %peer,
            sessions = sessions.len(),
            "Viewer connected"
        );

        rx
    }

    /// Remove a session; its receiver is dropped by the session itself
    pub async fn unregister_session(&self, session_id: u64) {
        let mut sessions = self.sessions.write().await;
        if let Some(context) = sessions.remove(&session_id) {
            tracing::info!(
                session_id = session_id,
                peer = %context.peer_addr,
                connected_for = ?context.age(),
                sessions = sessions.len(),
                "Viewer disconnected"
            );
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// A raw snapshot receiver that is not tracked as a session
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotFrame> {
        self.tx.subscribe()
    }

    /// Signal the tick loop and every session to stop
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::info!("Broadcaster shutting down");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// A receiver that observes `true` once shutdown starts
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Current server statistics
    pub async fn stats(&self) -> ServerStats {
        let mut stats = ServerStats::new(self.started_at);
        stats.total_sessions = self.total_sessions.load(Ordering::Relaxed);
        stats.active_sessions = self.sessions.read().await.len() as u64;
        stats.live_sources = self.aggregator.lock().await.source_count();
        stats.ticks = self.counters.snapshot();
        stats
    }
}
