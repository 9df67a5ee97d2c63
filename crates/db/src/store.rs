use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::pipeline_execution::PipelineExecution;
use crate::models::task::Task;
use crate::models::task_source::TaskSource;
use crate::models::task_source_sync_state::TaskSourceSyncState;
use crate::models::user_quota::{QuotaKind, UserQuota};

/// The engine-specific query surface, layered over the per-entity model
/// methods. A thin typed surface, not a second ORM: every method here just
/// picks which model query to run.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn find_task_sources_needing_sync(
        &self,
        threshold_min: i64,
        queued_timeout_min: i64,
    ) -> StoreResult<Vec<TaskSource>> {
        TaskSource::find_needing_sync(&self.pool, threshold_min, queued_timeout_min).await
    }

    pub async fn find_tasks_needing_evaluation(&self) -> StoreResult<Vec<Task>> {
        Task::find_needing_evaluation(&self.pool).await
    }

    pub async fn find_stale_pipeline_executions(&self, timeout_min: i64) -> StoreResult<Vec<PipelineExecution>> {
        PipelineExecution::find_stale(&self.pool, timeout_min).await
    }

    pub async fn find_stuck_evaluating_tasks(&self, timeout_min: i64) -> StoreResult<Vec<Task>> {
        Task::find_stuck_evaluating(&self.pool, timeout_min).await
    }

    pub async fn batch_upsert_sync_states(
        &self,
        task_source_id: Uuid,
        rows: &[(String, DateTime<Utc>)],
    ) -> StoreResult<()> {
        TaskSourceSyncState::batch_upsert(&self.pool, task_source_id, rows).await
    }

    pub async fn increment_quota_usage(&self, user_id: Uuid, kind: QuotaKind) -> StoreResult<()> {
        UserQuota::increment_usage(&self.pool, user_id, kind).await
    }

    pub async fn quota_for(&self, user_id: Uuid) -> StoreResult<UserQuota> {
        UserQuota::find_or_default(&self.pool, user_id).await
    }
}
