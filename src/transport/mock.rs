//! In-memory transport
//!
//! Simulates a network of sources for tests and demos. Each registered
//! source is backed by a shared queue: the test side pushes samples or
//! injects failures through a [`MockSource`], and connections opened by the
//! relay drain the same queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{PullError, TransportError};

use super::{RawSample, SourceConnection, SourceDescription, SourceTransport};

#[derive(Debug, Default)]
struct SourceState {
    pending: VecDeque<RawSample>,
    /// Failures returned by upcoming pulls, in order
    failures: VecDeque<PullError>,
    /// Every pull fails transiently while set
    always_transient: bool,
    /// Every pull fails permanently while set
    closed: bool,
    /// Connection attempts are refused while set
    refuse_connect: bool,
    /// Source is advertised by `resolve`
    advertised: bool,
    /// Number of pull calls served
    pulls: u64,
    /// Time every pull blocks before answering
    pull_latency: Duration,
}

fn lock(state: &Mutex<SourceState>) -> MutexGuard<'_, SourceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test-side handle of one simulated source
#[derive(Debug, Clone)]
pub struct MockSource {
    description: SourceDescription,
    state: Arc<Mutex<SourceState>>,
}

impl MockSource {
    pub fn description(&self) -> &SourceDescription {
        &self.description
    }

    /// Queue one sample
    pub fn push(&self, timestamp: f64, values: Vec<f64>) {
        lock(&self.state)
            .pending
            .push_back(RawSample::new(timestamp, values));
    }

    /// Queue `count` samples whose values all equal their 1-based sequence number,
    /// continuing from `start`
    pub fn push_sequence(&self, start: u64, count: u64) {
        let channels = self.description.channel_count;
        let mut state = lock(&self.state);
        for n in start..start + count {
            let v = n as f64;
            state
                .pending
                .push_back(RawSample::new(v, vec![v; channels]));
        }
    }

    /// Make the next pull fail with `error`
    pub fn fail_next(&self, error: PullError) {
        lock(&self.state).failures.push_back(error);
    }

    /// Make every pull fail transiently until cleared
    pub fn set_always_transient(&self, enabled: bool) {
        lock(&self.state).always_transient = enabled;
    }

    /// Simulate the source going away for good
    pub fn close(&self) {
        lock(&self.state).closed = true;
    }

    /// Refuse future connection attempts
    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.state).refuse_connect = refuse;
    }

    /// Stop (or resume) advertising this source in `resolve`
    pub fn set_advertised(&self, advertised: bool) {
        lock(&self.state).advertised = advertised;
    }

    /// Make every pull block the calling thread for `latency`
    pub fn set_pull_latency(&self, latency: Duration) {
        lock(&self.state).pull_latency = latency;
    }

    /// Number of samples not yet pulled
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Number of pull calls served so far
    pub fn pull_count(&self) -> u64 {
        lock(&self.state).pulls
    }
}

/// Simulated transport holding any number of [`MockSource`]s
#[derive(Debug, Default)]
pub struct MockTransport {
    sources: Mutex<Vec<MockSource>>,
    resolve_failure: Mutex<Option<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and advertise a source
    pub fn add_source(&self, description: SourceDescription) -> MockSource {
        let source = MockSource {
            description,
            state: Arc::new(Mutex::new(SourceState {
                advertised: true,
                ..SourceState::default()
            })),
        };

        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source.clone());
        source
    }

    /// Make `resolve` fail with `reason` (or succeed again with `None`)
    pub fn fail_resolve(&self, reason: Option<String>) {
        *self
            .resolve_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason;
    }

    fn find(&self, description: &SourceDescription) -> Option<MockSource> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.description.identity() == description.identity())
            .cloned()
    }
}

impl SourceTransport for MockTransport {
    fn resolve(&self, _wait: Duration) -> Result<Vec<SourceDescription>, TransportError> {
        if let Some(reason) = self
            .resolve_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(TransportError::ResolveFailed(reason));
        }

        let sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sources
            .iter()
            .filter(|s| lock(&s.state).advertised)
            .map(|s| s.description.clone())
            .collect())
    }

    fn connect(
        &self,
        description: &SourceDescription,
    ) -> Result<Box<dyn SourceConnection>, TransportError> {
        let source = self.find(description).ok_or_else(|| TransportError::ConnectFailed {
            name: description.name.clone(),
            reason: "no such source".into(),
        })?;

        if lock(&source.state).refuse_connect {
            return Err(TransportError::ConnectFailed {
                name: description.name.clone(),
                reason: "connection refused".into(),
            });
        }

        Ok(Box::new(MockConnection {
            state: source.state,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<SourceState>>,
}

impl SourceConnection for MockConnection {
    fn pull(&mut self, _timeout: Duration, max_samples: usize) -> Result<Vec<RawSample>, PullError> {
        let latency = lock(&self.state).pull_latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut state = lock(&self.state);
        state.pulls += 1;

        if state.closed {
            return Err(PullError::Permanent("stream source has been lost".into()));
        }
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        if state.always_transient {
            return Err(PullError::Transient("simulated read failure".into()));
        }

        let count = max_samples.min(state.pending.len());
        Ok(state.pending.drain(..count).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(name: &str) -> SourceDescription {
        SourceDescription::new(format!("{}-id", name), name, "EEG", 2, 250.0)
    }

    #[test]
    fn test_resolve_lists_advertised() {
        let transport = MockTransport::new();
        let a = transport.add_source(description("A"));
        transport.add_source(description("B"));

        assert_eq!(transport.resolve(Duration::ZERO).unwrap().len(), 2);

        a.set_advertised(false);
        let resolved = transport.resolve(Duration::ZERO).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "B");
    }

    #[test]
    fn test_pull_drains_in_order() {
        let transport = MockTransport::new();
        let source = transport.add_source(description("A"));
        let mut conn = transport.connect(source.description()).unwrap();

        source.push_sequence(1, 5);
        let first = conn.pull(Duration::ZERO, 3).unwrap();
        let second = conn.pull(Duration::ZERO, 3).unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].values, vec![5.0, 5.0]);
        assert_eq!(source.pending(), 0);
    }

    #[test]
    fn test_injected_failures() {
        let transport = MockTransport::new();
        let source = transport.add_source(description("A"));
        let mut conn = transport.connect(source.description()).unwrap();

        source.fail_next(PullError::Transient("blip".into()));
        assert!(matches!(
            conn.pull(Duration::ZERO, 1),
            Err(PullError::Transient(_))
        ));
        assert!(conn.pull(Duration::ZERO, 1).unwrap().is_empty());

        source.close();
        assert!(matches!(
            conn.pull(Duration::ZERO, 1),
            Err(PullError::Permanent(_))
        ));
    }

    #[test]
    fn test_refused_connection() {
        let transport = MockTransport::new();
        let source = transport.add_source(description("A"));
        source.refuse_connections(true);

        let result = transport.connect(source.description());
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }
}
