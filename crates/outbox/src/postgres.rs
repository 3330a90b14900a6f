use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    NewStagedEvent, OutboxError, OutboxStatus, OutboxStore, Result, StagedEvent, StagedEventId,
    StagingTransaction,
};

/// DDL for the `outbox_events` table. Safe to run repeatedly.
pub const OUTBOX_SCHEMA: &str = include_str!("../migrations/0001_create_outbox_events.sql");

/// Unique index allowing one PENDING row per correlation key.
const PENDING_KEY_INDEX: &str = "outbox_events_pending_key";

const COLUMNS: &str =
    "id, correlation_key, topic, event_type, payload, status, retry_count, last_error, created_at, updated_at";

/// Creates the outbox table and its indexes if they do not exist.
pub async fn install_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(OUTBOX_SCHEMA).execute(pool).await?;
    Ok(())
}

fn row_to_event(row: PgRow) -> Result<StagedEvent> {
    let status: String = row.try_get("status")?;
    let retry_count: i32 = row.try_get("retry_count")?;

    Ok(StagedEvent {
        id: StagedEventId::new(row.try_get("id")?),
        correlation_key: row.try_get("correlation_key")?,
        topic: row.try_get("topic")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        status: OutboxStatus::parse(&status)?,
        retry_count: u32::try_from(retry_count).unwrap_or_default(),
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl StagingTransaction for Transaction<'_, Postgres> {
    async fn insert_staged(&mut self, event: NewStagedEvent) -> Result<StagedEventId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_events (correlation_key, topic, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&event.correlation_key)
        .bind(&event.topic)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(&mut **self)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(PENDING_KEY_INDEX)
            {
                return OutboxError::DuplicatePending {
                    correlation_key: event.correlation_key.clone(),
                };
            }
            OutboxError::Database(e)
        })?;

        Ok(StagedEventId::new(id))
    }
}

/// PostgreSQL-backed outbox, sharing a database with the ledger that stages into it.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Explains why a guarded update touched no row.
    async fn rejected_transition(&self, id: StagedEventId, to: OutboxStatus) -> OutboxError {
        match self.get(id).await {
            Ok(Some(row)) => OutboxError::InvalidTransition {
                id,
                from: row.status,
                to,
            },
            Ok(None) => OutboxError::NotFound(id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<StagedEvent>> {
        self.list_by_status(OutboxStatus::Pending, limit).await
    }

    async fn mark_sent(&self, id: StagedEventId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'SENT', updated_at = clock_timestamp()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_transition(id, OutboxStatus::Sent).await);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: StagedEventId,
        error: &str,
        max_retry_count: u32,
    ) -> Result<StagedEvent> {
        let sql = format!(
            r#"
            UPDATE outbox_events
            SET retry_count = retry_count + 1,
                last_error = $2,
                status = CASE WHEN retry_count + 1 >= $3 THEN 'FAILED' ELSE 'PENDING' END,
                updated_at = clock_timestamp()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(error)
            .bind(i32::try_from(max_retry_count).unwrap_or(i32::MAX))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_event(row),
            None => Err(self.rejected_transition(id, OutboxStatus::Failed).await),
        }
    }

    async fn get(&self, id: StagedEventId) -> Result<Option<StagedEvent>> {
        let sql = format!("SELECT {COLUMNS} FROM outbox_events WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_event).transpose()
    }

    async fn list_by_status(&self, status: OutboxStatus, limit: usize) -> Result<Vec<StagedEvent>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM outbox_events WHERE status = $1 ORDER BY created_at ASC, id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_event).collect()
    }
}
