use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ops_core_broker::{Broker, EvalMessage, Queue, SyncMessage};
use ops_core_db::models::task::Task;
use ops_core_db::models::task_source::TaskSource;
use ops_core_db::SqlitePool;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::EngineResult;

/// Periodic top-up of the sync queue: re-publishes task
/// sources that are stale or stuck in `queued`/`syncing`. Runs once
/// immediately on startup, then on `interval_minutes`, and silences a
/// second concurrent `run` on the same instance.
pub struct SyncScheduler<'a> {
    pool: &'a SqlitePool,
    broker: &'a Broker,
    interval_minutes: i64,
    threshold_minutes: i64,
    queued_timeout_minutes: i64,
    started: Arc<AtomicBool>,
}

impl<'a> SyncScheduler<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        broker: &'a Broker,
        interval_minutes: i64,
        threshold_minutes: i64,
        queued_timeout_minutes: i64,
    ) -> Self {
        Self {
            pool,
            broker,
            interval_minutes,
            threshold_minutes,
            queued_timeout_minutes,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) -> EngineResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            info!("sync scheduler already running, ignoring duplicate start");
            return Ok(());
        }
        info!(interval_minutes = self.interval_minutes, "sync scheduler starting");

        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_minutes.max(1) as u64 * 60));
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sync scheduler stopping");
                        return Ok(());
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        let sources = match TaskSource::find_needing_sync(self.pool, self.threshold_minutes, self.queued_timeout_minutes).await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "sync scheduler: failed to list task sources needing sync");
                return;
            }
        };

        for source in sources {
            let stuck = matches!(
                source.sync_status,
                ops_core_db::models::task_source::SyncStatus::Queued | ops_core_db::models::task_source::SyncStatus::Syncing
            );
            if stuck {
                warn!(task_source_id = %source.id, "re-queueing task source stuck in queued/syncing");
            } else {
                info!(task_source_id = %source.id, "re-queueing stale task source for catch-up sync");
            }

            let message = SyncMessage {
                task_source_id: source.id,
                provider: source.r#type.to_string(),
            };
            if let Err(e) = self.broker.publish(Queue::TaskSync, &message).await {
                warn!(task_source_id = %source.id, error = %e, "failed to publish sync message");
            }
        }
    }
}

/// Periodic top-up of the eval queue: re-publishes tasks whose
/// simple evaluation hasn't started yet. Quota exhaustion is discovered and
/// swallowed downstream, per task, when the consumer processes the message.
pub struct EvalScheduler<'a> {
    pool: &'a SqlitePool,
    broker: &'a Broker,
    interval_minutes: i64,
    started: Arc<AtomicBool>,
}

impl<'a> EvalScheduler<'a> {
    pub fn new(pool: &'a SqlitePool, broker: &'a Broker, interval_minutes: i64) -> Self {
        Self {
            pool,
            broker,
            interval_minutes,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) -> EngineResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            info!("eval scheduler already running, ignoring duplicate start");
            return Ok(());
        }
        info!(interval_minutes = self.interval_minutes, "eval scheduler starting");

        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_minutes.max(1) as u64 * 60));
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("eval scheduler stopping");
                        return Ok(());
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        let tasks = match Task::find_needing_evaluation(self.pool).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "eval scheduler: failed to list tasks needing evaluation");
                return;
            }
        };

        for task in tasks {
            if let Err(e) = self.broker.publish(Queue::TaskEval, &EvalMessage { task_id: task.id }).await {
                warn!(task_id = %task.id, error = %e, "failed to publish eval message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use ops_core_db::models::project::{CreateProject, Project};
    use ops_core_db::models::task::{RemoteStatus, UpsertOutcome, UpsertTask};
    use ops_core_db::models::task_source::{CreateTaskSource, TaskSourceType};
    use uuid::Uuid;

    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn sync_scheduler_republishes_stale_sources() {
        let pool = memory_pool().await;
        let broker = Broker::new(pool.clone());

        let project = Project::create(
            &pool,
            &CreateProject {
                owner_user_id: Uuid::new_v4(),
                name: "demo".into(),
                job_executor_config: None,
                ai_provider_configs: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let source = TaskSource::create(
            &pool,
            &CreateTaskSource {
                project_id: project.id,
                name: "gitlab".into(),
                r#type: TaskSourceType::GitlabIssues,
                config: serde_json::json!({"repo": "acme/widgets"}),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        // Never synced, so it's immediately due regardless of threshold.

        let scheduler = SyncScheduler::new(&pool, &broker, 5, 60, 30);
        scheduler.tick().await;

        let deliveries = broker.consume(Queue::TaskSync, 10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        let published: SyncMessage = serde_json::from_value(deliveries[0].payload.clone()).unwrap();
        assert_eq!(published.task_source_id, source.id);
    }

    #[tokio::test]
    async fn eval_scheduler_republishes_tasks_needing_evaluation() {
        let pool = memory_pool().await;
        let broker = Broker::new(pool.clone());

        let project = Project::create(
            &pool,
            &CreateProject {
                owner_user_id: Uuid::new_v4(),
                name: "demo".into(),
                job_executor_config: None,
                ai_provider_configs: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let source = TaskSource::create(
            &pool,
            &CreateTaskSource {
                project_id: project.id,
                name: "gitlab".into(),
                r#type: TaskSourceType::GitlabIssues,
                config: serde_json::json!({"repo": "acme/widgets"}),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let data = UpsertTask {
            project_id: project.id,
            task_source_id: source.id,
            unique_id: "gitlab-acme/widgets-2",
            title: "needs eval",
            description: None,
            remote_status: RemoteStatus::Opened,
            source_issue: &serde_json::json!({}),
        };
        let task = match Task::upsert_from_issue(&pool, &data).await.unwrap() {
            UpsertOutcome::Created(t) => t,
            _ => unreachable!(),
        };

        let scheduler = EvalScheduler::new(&pool, &broker, 5);
        scheduler.tick().await;

        let deliveries = broker.consume(Queue::TaskEval, 10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        let published: EvalMessage = serde_json::from_value(deliveries[0].payload.clone()).unwrap();
        assert_eq!(published.task_id, task.id);
    }

    #[tokio::test]
    async fn duplicate_run_is_silenced() {
        let pool = memory_pool().await;
        let broker = Broker::new(pool.clone());
        let scheduler = SyncScheduler::new(&pool, &broker, 60, 60, 30);
        let started = scheduler.started.clone();
        started.store(true, Ordering::SeqCst);

        let (_tx, mut rx) = watch::channel(false);
        // With `started` already true, `run` must return immediately
        // without blocking on the ticker or the shutdown channel.
        scheduler.run(&mut rx).await.unwrap();
    }
}
