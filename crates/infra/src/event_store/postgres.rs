//! Postgres-backed event store implementation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | EventStoreError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Concurrent append on the same stream |
//! | Database (check constraint violation) | `23514` | `InvalidAppend` | Invalid data (e.g. sequence_number <= 0) |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Io / Tls / ... | N/A | `Backend` | Connection failures |
//!
//! ## Schema
//!
//! See `migrations/0001_event_store.sql`: an `events` table with a global
//! `BIGSERIAL` position (commit order for projection rebuilds) and a `streams`
//! table holding the current version of each stream.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Row, Transaction};
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

use gescom_core::{AggregateId, TenantId};

use super::r#trait::{batch_keys, EventStore, EventStoreError, StoredEvent, StreamAppend, StreamKey};

/// Postgres-backed append-only event store.
///
/// ## Atomic batches
///
/// `append_batch()` runs in one transaction:
/// 1. make sure a `streams` row exists for every stream in the batch
/// 2. lock those rows with `SELECT ... FOR UPDATE`, in a fixed key order so two
///    batches touching the same streams cannot deadlock
/// 3. check every expected version against the locked rows
/// 4. insert the events and bump the stream versions
///
/// Any failure rolls the whole batch back. The unique constraint on
/// `(tenant_id, aggregate_type, aggregate_id, sequence_number)` is a second
/// line of defence and surfaces as `Concurrency`.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, EventStoreError> {
        tracing::info!("connecting to PostgreSQL event store");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        tracing::info!("running event store migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EventStoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load all events for a stream, in sequence order.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id),
        err
    )]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_type)
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        decode_rows(rows)
    }

    /// Every event, in commit order.
    #[instrument(skip(self), err)]
    pub async fn load_all_async(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            ORDER BY global_position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        decode_rows(rows)
    }

    /// Append to several streams in one transaction.
    #[instrument(skip(self, batch), fields(streams = batch.len()), err)]
    pub async fn append_batch_async(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut keys = batch_keys(&batch)?;
        if keys.is_empty() {
            return Ok(vec![]);
        }
        keys.sort_by(|(_, a), (_, b)| a.lock_order().cmp(&b.lock_order()));

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut starts = Vec::with_capacity(keys.len());
        for (idx, key) in &keys {
            let current = lock_stream(&mut tx, key).await?;
            let expected = batch[*idx].expected_version;
            if !expected.matches(current) {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(EventStoreError::Concurrency(format!(
                    "{}/{}: expected {expected:?}, found {current}",
                    key.aggregate_type, key.aggregate_id
                )));
            }
            starts.push(current);
        }

        let mut batch: Vec<Option<StreamAppend>> = batch.into_iter().map(Some).collect();
        let mut committed = Vec::new();
        for ((idx, key), current) in keys.into_iter().zip(starts) {
            let Some(append) = batch[idx].take() else {
                continue;
            };

            let mut next = current + 1;
            for event in append.events {
                insert_event(&mut tx, &event, next).await?;
                committed.push(StoredEvent {
                    event_id: event.event_id,
                    tenant_id: event.tenant_id,
                    aggregate_id: event.aggregate_id,
                    aggregate_type: event.aggregate_type,
                    sequence_number: next,
                    event_type: event.event_type,
                    event_version: event.event_version,
                    occurred_at: event.occurred_at,
                    payload: event.payload,
                });
                next += 1;
            }

            sqlx::query(
                r#"
                UPDATE streams SET version = $4
                WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
                "#,
            )
            .bind(key.tenant_id.as_uuid())
            .bind(&key.aggregate_type)
            .bind(key.aggregate_id.as_uuid())
            .bind((next - 1) as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_stream_version", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }

    /// Run a store future from the synchronous `EventStore` interface.
    ///
    /// Requires a multi-threaded tokio runtime; the worker thread is handed over
    /// to the blocking pool while the query runs.
    fn block_on<F, T>(&self, fut: F) -> Result<T, EventStoreError>
    where
        F: Future<Output = Result<T, EventStoreError>>,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            EventStoreError::Backend("PostgresEventStore must be called inside a tokio runtime".to_string())
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

async fn lock_stream(
    tx: &mut Transaction<'_, Postgres>,
    key: &StreamKey,
) -> Result<u64, EventStoreError> {
    sqlx::query(
        r#"
        INSERT INTO streams (tenant_id, aggregate_type, aggregate_id, version)
        VALUES ($1, $2, $3, 0)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(key.tenant_id.as_uuid())
    .bind(&key.aggregate_type)
    .bind(key.aggregate_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("ensure_stream", e))?;

    let row = sqlx::query(
        r#"
        SELECT version FROM streams
        WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
        FOR UPDATE
        "#,
    )
    .bind(key.tenant_id.as_uuid())
    .bind(&key.aggregate_type)
    .bind(key.aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_stream", e))?;

    let version: i64 = row
        .try_get("version")
        .map_err(|e| EventStoreError::Backend(format!("failed to read stream version: {e}")))?;
    Ok(version as u64)
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &super::UncommittedEvent,
    sequence_number: u64,
) -> Result<(), EventStoreError> {
    sqlx::query(
        r#"
        INSERT INTO events (
            event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
            event_type, event_version, occurred_at, payload
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.event_id)
    .bind(event.tenant_id.as_uuid())
    .bind(event.aggregate_id.as_uuid())
    .bind(&event.aggregate_type)
    .bind(sequence_number as i64)
    .bind(&event.event_type)
    .bind(event.event_version as i32)
    .bind(event.occurred_at)
    .bind(&event.payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            EventStoreError::Concurrency(format!(
                "concurrent append detected: sequence_number {sequence_number} already exists"
            ))
        } else {
            map_sqlx_error("insert_event", e)
        }
    })?;
    Ok(())
}

fn decode_rows(rows: Vec<PgRow>) -> Result<Vec<StoredEvent>, EventStoreError> {
    rows.iter()
        .map(|row| {
            StoredEventRow::from_row(row)
                .map(StoredEvent::from)
                .map_err(|e| EventStoreError::Backend(format!("failed to decode event row: {e}")))
        })
        .collect()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    aggregate_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for StoredEventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            tenant_id: row.try_get("tenant_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        }
    }
}

impl EventStore for PostgresEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.append_batch_async(batch))
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.load_stream_async(tenant_id, aggregate_type, aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.load_all_async())
    }
}
