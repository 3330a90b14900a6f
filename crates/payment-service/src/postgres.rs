use async_trait::async_trait;
use common::{Money, OrderId, PaymentStatus};
use outbox::{OutboxAppender, PostgresOutboxStore};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{PaymentError, Result, Settlement, SettlementStore};

/// DDL for the `settlements` table. Safe to run repeatedly.
pub const SETTLEMENTS_SCHEMA: &str = include_str!("../migrations/0001_create_settlements.sql");

/// Unique constraint allowing one settlement per order.
const ORDER_ID_KEY: &str = "settlements_order_id_key";

/// PostgreSQL-backed settlement store.
#[derive(Clone)]
pub struct PostgresSettlementStore {
    pool: PgPool,
}

impl PostgresSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The outbox living next to the settlements.
    pub fn outbox(&self) -> PostgresOutboxStore {
        PostgresOutboxStore::new(self.pool.clone())
    }

    /// Creates the settlements and outbox tables if they do not exist.
    pub async fn install_schema(&self) -> Result<()> {
        outbox::postgres::install_schema(&self.pool).await?;
        sqlx::raw_sql(SETTLEMENTS_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_settlement(row: PgRow) -> Result<Settlement> {
        let status: String = row.try_get("status")?;

        Ok(Settlement {
            id: row.try_get::<Uuid, _>("id")?,
            order_id: OrderId::new(row.try_get("order_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status: PaymentStatus::parse(&status).ok_or(PaymentError::InvalidStatus(status))?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl SettlementStore for PostgresSettlementStore {
    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Settlement>> {
        let row = sqlx::query(
            "SELECT id, order_id, amount_cents, status, created_at FROM settlements WHERE order_id = $1",
        )
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_settlement).transpose()
    }

    async fn record_settlement(
        &self,
        order_id: OrderId,
        amount: Money,
        status: PaymentStatus,
    ) -> Result<Settlement> {
        let settlement = Settlement::new(order_id, amount, status);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO settlements (id, order_id, amount_cents, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(settlement.id)
        .bind(order_id.as_i64())
        .bind(amount.cents())
        .bind(status.as_str())
        .bind(settlement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // A concurrent delivery committed first
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(ORDER_ID_KEY)
            {
                return PaymentError::AlreadySettled(order_id);
            }
            PaymentError::Database(e)
        })?;

        tx.append(&settlement.to_event()).await?;

        tx.commit().await?;
        Ok(settlement)
    }
}
