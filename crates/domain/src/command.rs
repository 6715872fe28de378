//! Loading aggregates and turning their decisions into stream appends.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, StreamAppend, Version,
};

use crate::aggregate::{DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Outcome of [`CommandHandler::execute`].
#[derive(Debug)]
pub struct CommandResult<A: SnapshotCapable> {
    /// State after the new events.
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub new_version: Version,
}

/// Events decided against one aggregate, ready to join a commit.
#[derive(Debug)]
pub struct Staged<A> {
    /// State as it will be once the append is committed.
    pub aggregate: A,
    pub append: StreamAppend,
    /// Present when the post-commit version falls on a snapshot boundary.
    pub snapshot: Option<Snapshot>,
}

/// Loads aggregates of type `A` from `S` and stages their events.
pub struct CommandHandler<S, A> {
    store: S,
    _phantom: PhantomData<A>,
}

impl<S: Clone, A> Clone for CommandHandler<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds an aggregate from its latest snapshot and the events after
    /// it. An unknown stream yields `A::default()`.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_stream(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let version = snapshot.version;
                let mut restored: A = snapshot.restore()?;
                restored.set_version(version);
                restored
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Like [`load`](Self::load) but `None` for streams that were never created.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Like [`load_existing`](Self::load_existing) but a missing stream is
    /// `NotFound { entity }`.
    pub async fn require(
        &self,
        aggregate_id: AggregateId,
        entity: &'static str,
    ) -> Result<A, DomainError> {
        self.load_existing(aggregate_id)
            .await?
            .ok_or_else(|| DomainError::not_found(entity, aggregate_id))
    }

    /// Wraps `events` into an append conditioned on `aggregate`'s current
    /// version. Returns `None` when there is nothing to write.
    pub fn stage(
        &self,
        aggregate_id: AggregateId,
        aggregate: &A,
        events: Vec<A::Event>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<Staged<A>>, DomainError> {
        if events.is_empty() {
            return Ok(None);
        }

        let current = aggregate.version();
        let mut next = aggregate.clone();
        let mut version = current;
        let mut envelopes = Vec::with_capacity(events.len());

        for event in events {
            version = version.next();
            let mut builder = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .recorded_at(recorded_at)
                .payload(&event)?;
            for (key, value) in event.tags() {
                builder = builder.tag(key, value);
            }
            envelopes.push(builder.build()?);
            next.apply(event);
        }
        next.set_version(version);

        let snapshot = if next.should_snapshot() {
            Some(Snapshot::capture(
                aggregate_id,
                A::aggregate_type(),
                version,
                &next,
            )?)
        } else {
            None
        };

        Ok(Some(Staged {
            aggregate: next,
            append: StreamAppend::new(envelopes, AppendOptions::expect_version(current)),
            snapshot,
        }))
    }

    /// Loads the aggregate, runs `decide` against it and commits the
    /// resulting events to its stream alone.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        recorded_at: DateTime<Utc>,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load(aggregate_id).await?;
        let events = decide(&aggregate)?;

        let Some(staged) = self.stage(aggregate_id, &aggregate, events.clone(), recorded_at)?
        else {
            let new_version = aggregate.version();
            return Ok(CommandResult {
                aggregate,
                events,
                new_version,
            });
        };

        let new_version = self.store.append(staged.append.events, staged.append.options).await?;

        if let Some(snapshot) = staged.snapshot
            && let Err(e) = self.store.save_snapshot(snapshot).await
        {
            tracing::warn!(aggregate_id = %aggregate_id, error = %e, "failed to save snapshot");
        }

        Ok(CommandResult {
            aggregate: staged.aggregate,
            events,
            new_version,
        })
    }
}
