use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, StreamAppend, validate_commit},
};

#[derive(Default)]
struct MemoryState {
    events: Vec<EventEnvelope>,
    heads: HashMap<AggregateId, Version>,
    snapshots: HashMap<AggregateId, Snapshot>,
    injected_conflicts: usize,
}

impl MemoryState {
    fn head(&self, aggregate_id: AggregateId) -> Version {
        self.heads
            .get(&aggregate_id)
            .copied()
            .unwrap_or_else(Version::initial)
    }
}

/// Event store held in process memory.
///
/// A single lock guards all streams, so a commit observes and writes every
/// stream it names as one step. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Makes the next `count` commits fail with `ConcurrencyConflict`
    /// without writing anything.
    pub async fn fail_next_commits(&self, count: usize) {
        self.state.write().await.injected_conflicts = count;
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_commit(&appends)?;

        let mut state = self.state.write().await;

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            let first = &appends[0].events[0];
            let actual = state.head(first.aggregate_id);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: first.aggregate_id,
                expected: appends[0].options.expected_version.unwrap_or(actual),
                actual,
            });
        }

        // Check every stream before touching any of them.
        for append in &appends {
            let first = &append.events[0];
            let actual = state.head(first.aggregate_id);
            let expected = append.options.expected_version.unwrap_or(actual);
            if actual != expected || first.version != actual.next() {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        let events: usize = appends.iter().map(|a| a.events.len()).sum();
        let streams = appends.len();
        let mut versions = Vec::with_capacity(streams);
        for append in appends {
            let Some(last) = append.last_version() else {
                continue;
            };
            let aggregate_id = append.events[0].aggregate_id;
            state.heads.insert(aggregate_id, last);
            state.events.extend(append.events);
            versions.push(last);
        }

        metrics::counter!("event_store_events_appended_total", "backend" => "memory")
            .increment(events as u64);
        tracing::trace!(streams, events, "commit written");
        Ok(versions)
    }

    async fn read_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.read_stream_from(aggregate_id, Version::first()).await
    }

    async fn read_stream_from(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        events.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.version.cmp(&b.version))
        });
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.state.read().await.heads.get(&aggregate_id).copied())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut state = self.state.write().await;
        state.snapshots.insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.state.read().await.snapshots.get(&aggregate_id).cloned())
    }
}
