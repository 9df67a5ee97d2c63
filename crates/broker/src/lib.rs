pub mod broker;
pub mod consumer;
pub mod error;
pub mod message;
pub mod queue;

pub use broker::Broker;
pub use consumer::{Consumer, Handler};
pub use error::{BrokerError, BrokerResult};
pub use message::{Delivery, EvalMessage, ImplMessage, MessageStatus, SyncMessage};
pub use queue::{Queue, MAX_RETRIES};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use ops_core_db::SqlitePool;
    use uuid::Uuid;

    use super::*;

    async fn memory_broker() -> Broker {
        let pool = SqlitePool::connect("sqlite::memory:").await.expect("open pool");
        sqlx::migrate!("../db/migrations").run(&pool).await.expect("run migrations");
        Broker::new(pool)
    }

    #[tokio::test]
    async fn publish_then_consume_claims_message() {
        let broker = memory_broker().await;
        broker
            .publish(
                Queue::TaskEval,
                &EvalMessage {
                    task_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap();

        let deliveries = broker.consume(Queue::TaskEval, 5).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].attempt, 0);

        // Already in_flight: a second consumer must not see it again.
        let deliveries = broker.consume(Queue::TaskEval, 5).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn nack_below_max_retries_requeues() {
        let broker = memory_broker().await;
        let id = broker
            .publish(
                Queue::TaskImpl,
                &ImplMessage {
                    task_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap();

        broker.consume(Queue::TaskImpl, 1).await.unwrap();
        broker.nack(id).await.unwrap();

        let (status, attempt): (String, i64) =
            sqlx::query_as("SELECT status, attempt FROM broker_messages WHERE id = ?")
                .bind(id)
                .fetch_one(broker.pool())
                .await
                .unwrap();
        assert_eq!(status, "ready");
        assert_eq!(attempt, 1);
    }

    #[tokio::test]
    async fn nack_past_max_retries_routes_to_dlq() {
        let broker = memory_broker().await;
        let id = broker
            .publish(
                Queue::TaskSync,
                &SyncMessage {
                    task_source_id: Uuid::new_v4(),
                    provider: "gitlab".into(),
                },
            )
            .await
            .unwrap();

        for _ in 0..MAX_RETRIES {
            broker.nack(id).await.unwrap();
        }

        let dead = broker.dead_letters(Queue::TaskSync).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
    }
}
