//! SQLite work queue.
//!
//! All named queues share the `queue_messages` table. Visibility is a
//! millisecond wall-clock deadline, so a console and a separate ingest
//! process can share one database file.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Alias, Expr, Order, Query, SqliteQueryBuilder};
use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use super::{Delivery, QueueError, Result, WorkQueue};
use crate::storage::schema::{QueueMessages, CREATE_QUEUE_TABLE};

/// SQLite implementation of WorkQueue.
pub struct SqliteWorkQueue {
    pool: SqlitePool,
    name: String,
    visibility_timeout: Duration,
}

impl SqliteWorkQueue {
    /// Create a new SQLite work queue.
    pub fn new(pool: SqlitePool, name: &str, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            name: name.to_string(),
            visibility_timeout,
        }
    }

    /// Roll back an open transaction. A connection that cannot be rolled
    /// back is closed instead of going back to the pool mid-transaction.
    async fn abort(mut conn: PoolConnection<Sqlite>) {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            warn!(error = %e, "Rollback failed, closing queue connection");
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Failed to close queue connection");
            }
        }
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Claim visible messages within an already-started transaction.
    async fn claim(
        conn: &mut SqliteConnection,
        queue: &str,
        max: usize,
        visible_until: i64,
    ) -> Result<Vec<Delivery>> {
        let now = Self::now_millis();

        let query = Query::select()
            .columns([
                QueueMessages::Id,
                QueueMessages::Payload,
                QueueMessages::DequeueCount,
            ])
            .from(QueueMessages::Table)
            .and_where(Expr::col(QueueMessages::Queue).eq(queue))
            .and_where(Expr::col(QueueMessages::VisibleAt).lte(now))
            .order_by(QueueMessages::VisibleAt, Order::Asc)
            .order_by(Alias::new("rowid"), Order::Asc)
            .limit(max as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let payload: String = row.try_get("payload")?;
            let dequeue_count: i64 = row.try_get("dequeue_count")?;
            let dequeue_count = dequeue_count as u32 + 1;
            let receipt = Uuid::new_v4().to_string();

            let update = Query::update()
                .table(QueueMessages::Table)
                .values([
                    (QueueMessages::DequeueCount, dequeue_count.into()),
                    (QueueMessages::Receipt, receipt.as_str().into()),
                    (QueueMessages::VisibleAt, visible_until.into()),
                ])
                .and_where(Expr::col(QueueMessages::Queue).eq(queue))
                .and_where(Expr::col(QueueMessages::Id).eq(id.as_str()))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&update).execute(&mut *conn).await?;

            deliveries.push(Delivery {
                receipt,
                payload,
                dequeue_count,
            });
        }

        Ok(deliveries)
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_absent(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_QUEUE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn enqueue(&self, payload: &str) -> Result<()> {
        let query = Query::insert()
            .into_table(QueueMessages::Table)
            .columns([
                QueueMessages::Queue,
                QueueMessages::Id,
                QueueMessages::Payload,
                QueueMessages::VisibleAt,
                QueueMessages::DequeueCount,
            ])
            .values_panic([
                self.name.as_str().into(),
                Uuid::new_v4().to_string().into(),
                payload.into(),
                Self::now_millis().into(),
                0i64.into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let visible_until = Self::now_millis() + self.visibility_timeout.as_millis() as i64;

        // BEGIN IMMEDIATE takes the write lock upfront so two consumers
        // cannot claim the same message.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let claimed = match Self::claim(&mut conn, &self.name, max, visible_until).await {
            Ok(deliveries) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| deliveries)
                .map_err(QueueError::from),
            Err(e) => Err(e),
        };

        if claimed.is_err() {
            Self::abort(conn).await;
        }
        claimed
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        let query = Query::delete()
            .from_table(QueueMessages::Table)
            .and_where(Expr::col(QueueMessages::Queue).eq(self.name.as_str()))
            .and_where(Expr::col(QueueMessages::Receipt).eq(receipt))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownReceipt(receipt.to_string()));
        }
        Ok(())
    }

    async fn release(&self, receipt: &str) -> Result<()> {
        let query = Query::update()
            .table(QueueMessages::Table)
            .values([
                (QueueMessages::VisibleAt, Self::now_millis().into()),
                (QueueMessages::Receipt, Option::<String>::None.into()),
            ])
            .and_where(Expr::col(QueueMessages::Queue).eq(self.name.as_str()))
            .and_where(Expr::col(QueueMessages::Receipt).eq(receipt))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownReceipt(receipt.to_string()));
        }
        Ok(())
    }
}
