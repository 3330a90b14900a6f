use async_trait::async_trait;
use common::{Money, OrderCreated, OrderId, PaymentStatus};
use outbox::{OutboxAppender, PostgresOutboxStore};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{Order, OrderError, OrderStatus, OrderStore, Result, Transition};

/// DDL for the `orders` table. Safe to run repeatedly.
pub const ORDERS_SCHEMA: &str = include_str!("../migrations/0001_create_orders.sql");

/// PostgreSQL-backed order store.
///
/// Orders and the order-side outbox share one database so that an order and
/// its staged event commit together.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The outbox living next to the orders.
    pub fn outbox(&self) -> PostgresOutboxStore {
        PostgresOutboxStore::new(self.pool.clone())
    }

    /// Creates the orders and outbox tables if they do not exist.
    pub async fn install_schema(&self) -> Result<()> {
        outbox::postgres::install_schema(&self.pool).await?;
        sqlx::raw_sql(ORDERS_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status: OrderStatus::parse(&status).ok_or(OrderError::InvalidStatus(status))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, amount: Money) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (amount_cents)
            VALUES ($1)
            RETURNING id, amount_cents, status, created_at, updated_at
            "#,
        )
        .bind(amount.cents())
        .fetch_one(&mut *tx)
        .await?;
        let order = Self::row_to_order(row)?;

        tx.append(&OrderCreated::new(order.id, order.amount)).await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, amount_cents, status, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn apply_settlement(&self, id: OrderId, outcome: PaymentStatus) -> Result<Transition> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so the status guard and the update see the same state.
        let row = sqlx::query(
            r#"
            SELECT id, amount_cents, status, created_at, updated_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(OrderError::NotFound(id))?;

        let mut order = Self::row_to_order(row)?;
        let transition = order.apply_settlement(outcome);
        if !transition.is_applied() {
            return Ok(transition);
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = clock_timestamp() WHERE id = $1")
            .bind(id.as_i64())
            .bind(order.status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(transition)
    }
}
