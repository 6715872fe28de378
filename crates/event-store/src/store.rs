use std::collections::HashSet;

use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, Version};

/// Write condition for one stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Version the stream must be at for the write to go through.
    /// `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// No version check.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The stream must not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// Events destined for one stream inside a commit.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl StreamAppend {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.events.first().map(|e| e.aggregate_id)
    }

    pub fn last_version(&self) -> Option<Version> {
        self.events.last().map(|e| e.version)
    }
}

/// Persistence for event streams.
///
/// Implementations must give read-your-writes and check every expected
/// version of a commit before writing any of it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends to one or more streams atomically.
    ///
    /// Either every stream append is written or none is. A stream whose
    /// current version differs from its `expected_version` fails the whole
    /// commit with `ConcurrencyConflict`. Returns the new version of each
    /// stream, in input order.
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// All events of a stream, oldest first.
    async fn read_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Events of a stream starting at `from_version` (inclusive).
    async fn read_stream_from(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events matching `query`, ordered by record time then version.
    async fn query(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Current version of a stream, `None` if it has no events.
    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Stores a snapshot, replacing any previous one for the stream.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods available on every [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends to a single stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let versions = self.commit(vec![StreamAppend::new(events, options)]).await?;
        versions
            .into_iter()
            .next()
            .ok_or_else(|| EventStoreError::InvalidAppend("commit returned no version".into()))
    }

    async fn stream_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.stream_version(aggregate_id).await?.is_some())
    }

    /// Latest snapshot (if any) plus the events recorded after it.
    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        match self.load_snapshot(aggregate_id).await? {
            Some(snapshot) => {
                let events = self
                    .read_stream_from(aggregate_id, snapshot.version.next())
                    .await?;
                Ok((Some(snapshot), events))
            }
            None => Ok((None, self.read_stream(aggregate_id).await?)),
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks the shape of a commit before any implementation touches storage.
///
/// Each stream append must be non-empty, target a single stream with
/// consecutive versions, and start right after its expected version. A
/// stream may appear only once per commit.
pub fn validate_commit(appends: &[StreamAppend]) -> Result<()> {
    if appends.is_empty() {
        return Err(EventStoreError::InvalidAppend("empty commit".into()));
    }

    let mut seen = HashSet::new();
    for append in appends {
        let Some(first) = append.events.first() else {
            return Err(EventStoreError::InvalidAppend("empty stream append".into()));
        };

        if !seen.insert(first.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one commit",
                first.aggregate_id
            )));
        }

        if let Some(expected) = append.options.expected_version
            && first.version != expected.next()
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} expects version {expected} but first event is version {}",
                first.aggregate_id, first.version
            )));
        }

        let mut version = first.version;
        for event in append.events.iter().skip(1) {
            if event.aggregate_id != first.aggregate_id
                || event.aggregate_type != first.aggregate_type
            {
                return Err(EventStoreError::InvalidAppend(
                    "events of one stream append must share a stream".into(),
                ));
            }
            version = version.next();
            if event.version != version {
                return Err(EventStoreError::InvalidAppend(format!(
                    "versions must be consecutive: expected {version}, got {}",
                    event.version
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(stream: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("Sample")
            .aggregate_id(stream)
            .aggregate_type("Sample")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_independent_streams() {
        let a = AggregateId::new();
        let b = AggregateId::new();
        let commit = vec![
            StreamAppend::new(vec![event(a, 1), event(a, 2)], AppendOptions::expect_new()),
            StreamAppend::new(vec![event(b, 4)], AppendOptions::expect_version(Version::new(3))),
        ];
        assert!(validate_commit(&commit).is_ok());
    }

    #[test]
    fn rejects_empty_commits_and_appends() {
        assert!(validate_commit(&[]).is_err());
        assert!(validate_commit(&[StreamAppend::new(vec![], AppendOptions::any())]).is_err());
    }

    #[test]
    fn rejects_a_stream_named_twice() {
        let a = AggregateId::new();
        let commit = vec![
            StreamAppend::new(vec![event(a, 1)], AppendOptions::any()),
            StreamAppend::new(vec![event(a, 2)], AppendOptions::any()),
        ];
        assert!(matches!(
            validate_commit(&commit),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }

    #[test]
    fn rejects_version_gaps() {
        let a = AggregateId::new();
        let commit = vec![StreamAppend::new(
            vec![event(a, 1), event(a, 3)],
            AppendOptions::any(),
        )];
        assert!(validate_commit(&commit).is_err());
    }

    #[test]
    fn rejects_mismatch_with_expected_version() {
        let a = AggregateId::new();
        let commit = vec![StreamAppend::new(
            vec![event(a, 5)],
            AppendOptions::expect_version(Version::new(2)),
        )];
        assert!(validate_commit(&commit).is_err());
    }
}
