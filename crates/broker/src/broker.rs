use chrono::Utc;
use ops_core_db::SqlitePool;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BrokerError, BrokerResult};
use crate::message::{Delivery, MessageRow};
use crate::queue::{Queue, MAX_RETRIES};

/// Durable queue adapter over `broker_messages`, colocated in the store's
/// database. One instance is shared across runners; it is
/// cooperative within a process (sequential per delivery, many deliveries up
/// to `prefetch` in flight) and parallel across processes since consumption
/// is a row-level `UPDATE ... WHERE status='ready'` claim.
#[derive(Clone)]
pub struct Broker {
    pool: SqlitePool,
}

impl Broker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn publish<T: Serialize>(&self, queue: Queue, payload: &T) -> BrokerResult<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_string(payload)?;
        sqlx::query("INSERT INTO broker_messages (id, queue, payload) VALUES (?, ?, ?)")
            .bind(id)
            .bind(queue.to_string())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        debug!(%id, %queue, "published message");
        Ok(id)
    }

    /// Claims up to `prefetch` ready messages for `queue`, marking them
    /// `in_flight` so a concurrent consumer (another process) can't also
    /// claim them. Deliveries must be ack'd or nack'd by the caller.
    pub async fn consume(&self, queue: Queue, prefetch: u32) -> BrokerResult<Vec<Delivery>> {
        let mut tx = self.pool.begin().await?;

        let candidates = sqlx::query_as::<_, MessageRow>(
            r#"SELECT * FROM broker_messages
               WHERE queue = ? AND status = 'ready' AND available_at <= ?
               ORDER BY available_at ASC
               LIMIT ?"#,
        )
        .bind(queue.to_string())
        .bind(Utc::now())
        .bind(prefetch as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut deliveries = Vec::with_capacity(candidates.len());
        for row in candidates {
            sqlx::query("UPDATE broker_messages SET status = 'in_flight', updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(row.id)
                .execute(&mut *tx)
                .await?;

            let payload = serde_json::from_str(&row.payload)?;
            let queue: Queue = row
                .queue
                .parse()
                .map_err(|_| BrokerError::NotFound)?;
            deliveries.push(Delivery {
                id: row.id,
                queue,
                payload,
                attempt: row.attempt,
            });
        }

        tx.commit().await?;
        Ok(deliveries)
    }

    pub async fn ack(&self, id: Uuid) -> BrokerResult<()> {
        sqlx::query("UPDATE broker_messages SET status = 'done', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// On exception, the attempt counter is incremented; below `MAX_RETRIES`
    /// the message becomes `ready` again (with a short backoff) for
    /// redelivery, otherwise it is routed to the DLQ (`status=dead`). Never
    /// blocks the consumer loop — this is a single UPDATE.
    pub async fn nack(&self, id: Uuid) -> BrokerResult<()> {
        let (attempt,): (i64,) = sqlx::query_as("SELECT attempt FROM broker_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BrokerError::NotFound)?;

        let next_attempt = attempt + 1;
        if next_attempt >= MAX_RETRIES {
            warn!(%id, next_attempt, "message exceeded max retries, routing to DLQ");
            sqlx::query(
                "UPDATE broker_messages SET status = 'dead', attempt = ?, updated_at = ? WHERE id = ?",
            )
            .bind(next_attempt)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
            return Ok(());
        }

        let backoff_secs = 2i64.pow(next_attempt.max(0) as u32);
        let available_at = Utc::now() + chrono::Duration::seconds(backoff_secs);
        sqlx::query(
            r#"UPDATE broker_messages
               SET status = 'ready', attempt = ?, available_at = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(next_attempt)
        .bind(available_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Messages currently in the DLQ for `queue`, for operator inspection.
    pub async fn dead_letters(&self, queue: Queue) -> BrokerResult<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM broker_messages WHERE queue = ? AND status = 'dead'",
        )
        .bind(queue.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Delivery {
                    id: row.id,
                    queue,
                    payload: serde_json::from_str(&row.payload)?,
                    attempt: row.attempt,
                })
            })
            .collect()
    }
}
