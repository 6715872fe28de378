use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, StreamAppend, validate_commit},
};

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, recorded_at, payload, tags, metadata";

/// Event store backed by PostgreSQL.
///
/// A commit runs in one transaction; the `unique_aggregate_version`
/// constraint turns a racing writer into a `ConcurrencyConflict`.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let tags: BTreeMap<String, String> = serde_json::from_value(row.try_get("tags")?)?;
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.try_get("metadata")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
            tags,
            metadata,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_commit(&appends)?;

        let mut tx = self.pool.begin().await?;
        let mut versions = Vec::with_capacity(appends.len());

        for append in &appends {
            let first = &append.events[0];
            let aggregate_id = first.aggregate_id;

            let current: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1",
            )
            .bind(aggregate_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
            let actual = Version::new(current);
            let expected = append.options.expected_version.unwrap_or(actual);

            if actual != expected || first.version != actual.next() {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }

            for event in &append.events {
                sqlx::query(
                    r#"
                    INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, recorded_at, payload, tags, metadata)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(event.event_id.as_uuid())
                .bind(&event.event_type)
                .bind(event.aggregate_id.as_uuid())
                .bind(&event.aggregate_type)
                .bind(event.version.as_i64())
                .bind(event.recorded_at)
                .bind(&event.payload)
                .bind(serde_json::to_value(&event.tags)?)
                .bind(serde_json::to_value(&event.metadata)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.constraint() == Some("unique_aggregate_version")
                    {
                        return EventStoreError::ConcurrencyConflict {
                            aggregate_id,
                            expected,
                            actual: event.version,
                        };
                    }
                    EventStoreError::Database(e)
                })?;
            }

            versions.push(append.last_version().unwrap_or(actual));
        }

        tx.commit().await?;

        let events: usize = appends.iter().map(|a| a.events.len()).sum();
        metrics::counter!("event_store_events_appended_total", "backend" => "postgres")
            .increment(events as u64);
        tracing::debug!(streams = appends.len(), events, "commit written");
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
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE aggregate_id = $1 AND version >= $2 ORDER BY version ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
        let mut param_count = 0;

        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.aggregate_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ${param_count}"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }
        if !query.tags.is_empty() {
            param_count += 1;
            sql.push_str(&format!(" AND tags @> ${param_count}"));
        }
        if query.from_version.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND version >= ${param_count}"));
        }
        if query.to_version.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND version <= ${param_count}"));
        }

        sql.push_str(" ORDER BY recorded_at ASC, version ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(aggregate_type) = query.aggregate_type {
            sqlx_query = sqlx_query.bind(aggregate_type);
        }
        if let Some(event_types) = query.event_types {
            sqlx_query = sqlx_query.bind(event_types);
        }
        if !query.tags.is_empty() {
            sqlx_query = sqlx_query.bind(serde_json::to_value(&query.tags)?);
        }
        if let Some(from_version) = query.from_version {
            sqlx_query = sqlx_query.bind(from_version.as_i64());
        }
        if let Some(to_version) = query.to_version {
            sqlx_query = sqlx_query.bind(to_version.as_i64());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, taken_at, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                taken_at = EXCLUDED.taken_at,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.taken_at)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT aggregate_id, aggregate_type, version, taken_at, state FROM snapshots WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                taken_at: row.try_get::<DateTime<Utc>, _>("taken_at")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }
}
