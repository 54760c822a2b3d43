//! Aggregator implementation
//!
//! Owns the live source handles and the visibility flags. Every mutation
//! goes through `&mut self`, so callers sharing an aggregator put it behind a
//! single lock and each operation is atomic with respect to `poll`.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::source::{SourceHandle, SourceIdentity};

use super::config::AggregatorConfig;
use super::error::AggregatorError;
use super::snapshot::{ChannelSnapshot, PollReport, Snapshot, SourceSnapshot, ViewerConfig};
use super::visibility::VisibilityState;

/// Live source set plus visibility state
pub struct Aggregator {
    /// Live handles in insertion order
    handles: Vec<SourceHandle>,

    /// Visibility flags, kept across evictions
    visibility: VisibilityState,

    /// Total sample count of each handle at the previous snapshot
    last_emitted: HashMap<SourceIdentity, u64>,

    /// Channel labels last seen per identity
    layouts: HashMap<SourceIdentity, Vec<String>>,

    /// Tick id of the next snapshot
    next_tick_id: u64,

    /// Configuration
    config: AggregatorConfig,
}

impl Aggregator {
    /// Create an empty aggregator with default configuration
    pub fn new() -> Self {
        Self::with_config(AggregatorConfig::default())
    }

    /// Create an empty aggregator with custom configuration
    pub fn with_config(config: AggregatorConfig) -> Self {
        Self {
            handles: Vec::new(),
            visibility: VisibilityState::new(),
            last_emitted: HashMap::new(),
            layouts: HashMap::new(),
            next_tick_id: 0,
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Merge new handles into the live set
    ///
    /// Handles whose identity is already live are dropped. Returns how many
    /// were actually added.
    pub fn add(&mut self, handles: impl IntoIterator<Item = SourceHandle>) -> usize {
        let mut added = 0;

        for handle in handles {
            match self.try_add(handle) {
                Ok(()) => added += 1,
                Err(e) => tracing::debug!(error = %e, "Dropping duplicate handle"),
            }
        }

        added
    }

    /// Merge a single handle, failing if its identity is already live
    pub fn try_add(&mut self, handle: SourceHandle) -> Result<(), AggregatorError> {
        let identity = handle.identity().clone();

        if self.contains(&identity) {
            return Err(AggregatorError::DuplicateSource(identity));
        }

        let labels: Vec<String> = handle.channels().iter().map(|c| c.label.clone()).collect();
        if let Some(previous) = self.layouts.get(&identity) {
            if *previous != labels {
                tracing::warn!(
                    source = %identity,
                    previous_channels = previous.len(),
                    channels = labels.len(),
                    "Channel layout changed for re-added source, using new layout"
                );
            }
        }

        self.visibility.ensure(&identity, handle.channel_count());
        self.layouts.insert(identity.clone(), labels);
        self.last_emitted.insert(identity.clone(), 0);
        self.handles.push(handle);

        tracing::info!(
            source = %identity,
            sources = self.handles.len(),
            "Source added"
        );

        Ok(())
    }

    /// Update the visibility of one channel
    pub fn set_visibility(
        &mut self,
        identity: &SourceIdentity,
        channel_index: usize,
        visible: bool,
    ) -> Result<(), AggregatorError> {
        self.visibility.set(identity, channel_index, visible)?;

        tracing::debug!(
            source = %identity,
            channel = channel_index,
            visible = visible,
            "Channel visibility updated"
        );

        Ok(())
    }

    /// Pull every live source and assemble one snapshot
    ///
    /// Pull failures are collected into the report; they never stop the
    /// other sources from being polled or emitted. Channels marked invisible
    /// are left out of the snapshot entirely, as are sources that have
    /// never produced a sample.
    pub fn poll(&mut self) -> (Snapshot, PollReport) {
        let mut report = PollReport::default();

        for handle in self.handles.iter_mut().filter(|h| !h.is_dead()) {
            match handle.pull() {
                Ok(count) => report.samples_pulled += count,
                Err(e) => {
                    if e.is_permanent() {
                        tracing::warn!(source = %e.identity(), error = %e.reason(), "Source lost");
                        report.dead.push(e.identity().clone());
                    } else {
                        tracing::debug!(source = %e.identity(), error = %e.reason(), "Pull failed");
                    }
                    report.errors.push(e);
                }
            }
        }

        let tick_id = self.next_tick_id;
        self.next_tick_id += 1;

        let max_values = self.config.max_samples_per_tick;
        let mut sources = Vec::with_capacity(self.handles.len());

        for handle in &self.handles {
            let identity = handle.identity();
            let total = handle.total_samples();
            let previous = self.last_emitted.insert(identity.clone(), total).unwrap_or(0);

            if total == 0 {
                continue;
            }

            let new_samples = total.saturating_sub(previous);
            let take = if new_samples == 0 {
                1
            } else {
                (new_samples as usize).min(max_values)
            };

            let channels: Vec<ChannelSnapshot> = handle
                .channels()
                .iter()
                .enumerate()
                .filter(|(index, _)| self.visibility.is_visible(identity, *index))
                .map(|(index, channel)| ChannelSnapshot {
                    index,
                    label: channel.label.clone(),
                    unit: channel.unit.clone(),
                    kind: channel.kind,
                    values: handle.latest_channel(index, take),
                })
                .collect();

            if channels.is_empty() {
                continue;
            }

            sources.push(SourceSnapshot {
                identity: identity.clone(),
                nominal_rate: handle.nominal_rate(),
                total_samples: total,
                new_samples,
                last_timestamp: handle.last_timestamp(),
                channels,
            });
        }

        let snapshot = Snapshot {
            tick_id,
            t_server: unix_time(),
            config: ViewerConfig {
                max_samples: max_values,
                timer_interval_ms: 0,
            },
            sources,
        };

        (snapshot, report)
    }

    /// Remove every handle flagged dead by its own pull
    ///
    /// Visibility entries of evicted sources stay in place so a source that
    /// comes back under the same identity keeps its flags.
    pub fn evict_dead(&mut self) -> Vec<SourceIdentity> {
        let mut evicted = Vec::new();

        self.handles.retain(|handle| {
            if handle.is_dead() {
                evicted.push(handle.identity().clone());
                false
            } else {
                true
            }
        });

        for identity in &evicted {
            self.last_emitted.remove(identity);
            tracing::info!(source = %identity, "Source evicted");
        }

        evicted
    }

    /// Remove one handle regardless of its state
    pub fn remove(&mut self, identity: &SourceIdentity) -> Option<SourceHandle> {
        let position = self.handles.iter().position(|h| h.identity() == identity)?;
        self.last_emitted.remove(identity);
        Some(self.handles.remove(position))
    }

    /// Identities of all live handles
    pub fn known_identities(&self) -> HashSet<SourceIdentity> {
        self.handles.iter().map(|h| h.identity().clone()).collect()
    }

    pub fn contains(&self, identity: &SourceIdentity) -> bool {
        self.handles.iter().any(|h| h.identity() == identity)
    }

    /// Number of live handles
    pub fn source_count(&self) -> usize {
        self.handles.len()
    }

    pub fn handles(&self) -> &[SourceHandle] {
        &self.handles
    }

    /// Stored visibility flag of a channel, if known
    pub fn visibility(&self, identity: &SourceIdentity, channel_index: usize) -> Option<bool> {
        self.visibility.get(identity, channel_index)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::discovery::Discovery;
    use crate::error::PullError;
    use crate::source::SourceConfig;
    use crate::transport::{MockSource, MockTransport, SourceDescription};

    struct Fixture {
        transport: Arc<MockTransport>,
        a: MockSource,
        b: MockSource,
        aggregator: Aggregator,
    }

    /// Two sources: A (2 channels, rate R) and B (1 channel, rate 2R)
    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let a = transport.add_source(
            SourceDescription::new("a", "A", "EEG", 2, 100.0).labels(["Fz", "Cz"]),
        );
        let b = transport.add_source(SourceDescription::new("b", "B", "Gaze", 1, 200.0).labels(["x"]));

        let mut aggregator = Aggregator::new();
        let report = Discovery::new(transport.clone())
            .resolve(&HashSet::new())
            .unwrap();
        assert_eq!(aggregator.add(report.handles), 2);

        Fixture {
            transport,
            a,
            b,
            aggregator,
        }
    }

    fn open(transport: &MockTransport, desc: &SourceDescription) -> SourceHandle {
        SourceHandle::open(transport, desc, SourceConfig::default()).unwrap()
    }

    #[test]
    fn test_two_source_scenario() {
        let mut f = fixture();
        f.a.push_sequence(1, 1);
        f.b.push_sequence(1, 2);

        let (snapshot, report) = f.aggregator.poll();
        assert!(!report.has_errors());
        assert_eq!(snapshot.channel_count(), 3);

        let b_identity = f.b.description().identity();
        f.aggregator.set_visibility(&b_identity, 0, false).unwrap();

        f.a.push_sequence(2, 1);
        f.b.push_sequence(3, 2);
        let (snapshot, _) = f.aggregator.poll();
        assert_eq!(snapshot.channel_count(), 2);
        assert!(snapshot.source("B").is_none());
        assert_eq!(snapshot.source("A").unwrap().channels.len(), 2);

        let rediscovered = Discovery::new(f.transport.clone())
            .resolve(&f.aggregator.known_identities())
            .unwrap();
        assert_eq!(f.aggregator.add(rediscovered.handles), 0);
        assert_eq!(f.aggregator.source_count(), 2);
    }

    #[test]
    fn test_visibility_reappears_with_latest_value() {
        let mut f = fixture();
        let a_identity = f.a.description().identity();

        f.a.push_sequence(1, 3);
        f.aggregator.poll();

        f.aggregator.set_visibility(&a_identity, 1, false).unwrap();
        f.a.push_sequence(4, 3);
        let (snapshot, _) = f.aggregator.poll();
        let a = snapshot.source("A").unwrap();
        assert!(a.channel("Cz").is_none());
        assert_eq!(a.channel("Fz").unwrap().values, vec![4.0, 5.0, 6.0]);

        f.aggregator.set_visibility(&a_identity, 1, true).unwrap();
        let (snapshot, _) = f.aggregator.poll();
        let cz = snapshot.source("A").unwrap().channel("Cz").unwrap();
        assert_eq!(cz.values, vec![6.0]);
    }

    #[test]
    fn test_hidden_source_is_omitted() {
        let mut f = fixture();
        let a_identity = f.a.description().identity();
        f.a.push_sequence(1, 1);
        f.b.push_sequence(1, 1);

        f.aggregator.set_visibility(&a_identity, 0, false).unwrap();
        f.aggregator.set_visibility(&a_identity, 1, false).unwrap();

        let (snapshot, _) = f.aggregator.poll();
        assert_eq!(snapshot.sources.len(), 1);
        assert_eq!(snapshot.sources[0].name(), "B");
    }

    #[test]
    fn test_set_visibility_invalid_reference() {
        let mut f = fixture();
        let a_identity = f.a.description().identity();

        let result = f.aggregator.set_visibility(&a_identity, 2, false);
        assert!(matches!(
            result,
            Err(AggregatorError::InvalidReference { channel_index: 2, .. })
        ));

        let unknown = SourceIdentity::new("zz", "Z", "EEG");
        assert!(f.aggregator.set_visibility(&unknown, 0, true).is_err());
    }

    #[test]
    fn test_failing_source_does_not_block_others() {
        let mut f = fixture();
        f.a.set_always_transient(true);

        for tick in 0..5u64 {
            f.b.push_sequence(tick + 1, 1);
            let (snapshot, report) = f.aggregator.poll();

            assert_eq!(report.errors.len(), 1);
            assert!(report.errors[0].is_transient());
            assert!(!report.has_dead());

            let b = snapshot.source("B").unwrap();
            assert_eq!(b.channels[0].values, vec![(tick + 1) as f64]);
        }
        assert_eq!(f.aggregator.source_count(), 2);
    }

    #[test]
    fn test_values_since_last_snapshot() {
        let mut f = fixture();

        f.b.push_sequence(1, 4);
        let (snapshot, _) = f.aggregator.poll();
        let b = snapshot.source("B").unwrap();
        assert_eq!(b.new_samples, 4);
        assert_eq!(b.channels[0].values, vec![1.0, 2.0, 3.0, 4.0]);

        let (snapshot, _) = f.aggregator.poll();
        let b = snapshot.source("B").unwrap();
        assert_eq!(b.new_samples, 0);
        assert_eq!(b.channels[0].values, vec![4.0]);
    }

    #[test]
    fn test_values_capped_per_tick() {
        let transport = MockTransport::new();
        let desc = SourceDescription::new("c", "C", "ECG", 1, 1000.0);
        let source = transport.add_source(desc.clone());
        let mut aggregator =
            Aggregator::with_config(AggregatorConfig::default().max_samples_per_tick(3));
        aggregator.add([open(&transport, &desc)]);

        source.push_sequence(1, 10);
        let (snapshot, _) = aggregator.poll();
        let c = snapshot.source("C").unwrap();

        assert_eq!(c.new_samples, 10);
        assert_eq!(c.channels[0].values, vec![8.0, 9.0, 10.0]);
        assert_eq!(snapshot.config.max_samples, 3);
        assert_eq!(aggregator.handles()[0].total_samples(), 10);
    }

    #[test]
    fn test_source_without_data_omitted() {
        let mut f = fixture();
        f.b.push_sequence(1, 1);

        let (snapshot, _) = f.aggregator.poll();
        assert!(snapshot.source("A").is_none());
        assert!(snapshot.source("B").is_some());
    }

    #[test]
    fn test_tick_ids_increase() {
        let mut f = fixture();

        let (first, _) = f.aggregator.poll();
        let (second, _) = f.aggregator.poll();
        assert_eq!(second.tick_id, first.tick_id + 1);
    }

    #[test]
    fn test_evict_dead_keeps_visibility() {
        let mut f = fixture();
        let a_identity = f.a.description().identity();
        f.aggregator.set_visibility(&a_identity, 1, false).unwrap();

        f.a.fail_next(PullError::Permanent("gone".into()));
        let (_, report) = f.aggregator.poll();
        assert_eq!(report.dead, vec![a_identity.clone()]);

        let evicted = f.aggregator.evict_dead();
        assert_eq!(evicted, vec![a_identity.clone()]);
        assert_eq!(f.aggregator.source_count(), 1);
        assert_eq!(f.aggregator.visibility(&a_identity, 1), Some(false));

        // Same identity comes back and keeps its flags
        f.aggregator.add([open(&f.transport, f.a.description())]);
        assert_eq!(f.aggregator.source_count(), 2);
        assert_eq!(f.aggregator.visibility(&a_identity, 1), Some(false));
    }

    #[test]
    fn test_evicted_source_stops_appearing() {
        let mut f = fixture();
        f.a.push_sequence(1, 1);
        f.b.push_sequence(1, 1);
        f.aggregator.poll();

        f.a.close();
        let (_, report) = f.aggregator.poll();
        assert!(report.has_dead());
        f.aggregator.evict_dead();

        let (snapshot, report) = f.aggregator.poll();
        assert!(!report.has_errors());
        assert!(snapshot.source("A").is_none());
        assert!(snapshot.source("B").is_some());
    }

    #[test]
    fn test_try_add_duplicate() {
        let mut f = fixture();

        let duplicate = open(&f.transport, f.a.description());
        let result = f.aggregator.try_add(duplicate);
        assert!(matches!(result, Err(AggregatorError::DuplicateSource(_))));
    }

    #[test]
    fn test_layout_change_uses_new_handle() {
        let mut f = fixture();
        let a_identity = f.a.description().identity();
        f.aggregator.remove(&a_identity).unwrap();

        let wider = SourceDescription::new("a", "A", "EEG", 3, 100.0).labels(["Fz", "Cz", "Pz"]);
        let transport = MockTransport::new();
        let source = transport.add_source(wider.clone());
        f.aggregator.add([open(&transport, &wider)]);

        assert_eq!(f.aggregator.visibility(&a_identity, 2), Some(true));

        source.push_sequence(1, 1);
        let (snapshot, _) = f.aggregator.poll();
        assert_eq!(snapshot.source("A").unwrap().channels.len(), 3);
    }
}
