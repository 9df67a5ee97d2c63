use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl PipelineStatus {
    /// `success|failed|canceled` is terminal, never
    /// overwritten once set.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, FromRow)]
struct PipelineExecutionRow {
    id: Uuid,
    session_id: Uuid,
    worker_repository_id: Uuid,
    pipeline_id: String,
    status: String,
    last_status_update: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub session_id: Uuid,
    pub worker_repository_id: Uuid,
    pub pipeline_id: String,
    pub status: PipelineStatus,
    pub last_status_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PipelineExecutionRow> for PipelineExecution {
    type Error = StoreError;

    fn try_from(row: PipelineExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            worker_repository_id: row.worker_repository_id,
            pipeline_id: row.pipeline_id,
            status: row
                .status
                .parse()
                .map_err(|_| StoreError::Conflict("invalid pipeline_execution.status".into()))?,
            last_status_update: row.last_status_update,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PipelineExecution {
    pub async fn create(
        pool: &SqlitePool,
        session_id: Uuid,
        worker_repository_id: Uuid,
        pipeline_id: &str,
    ) -> StoreResult<Self> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO pipeline_executions (id, session_id, worker_repository_id, pipeline_id, status)
               VALUES (?, ?, ?, ?, 'pending')"#,
        )
        .bind(id)
        .bind(session_id)
        .bind(worker_repository_id)
        .bind(pipeline_id)
        .execute(pool)
        .await?;

        Self::require(pool, id).await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, PipelineExecutionRow>("SELECT * FROM pipeline_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(Self::try_from).transpose()
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound("pipeline_execution"))
    }

    /// Looks up the local execution row by the CI provider's own pipeline
    /// id, for the CI-triggered callback route.
    pub async fn find_by_pipeline_id(pool: &SqlitePool, pipeline_id: &str) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, PipelineExecutionRow>("SELECT * FROM pipeline_executions WHERE pipeline_id = ?")
            .bind(pipeline_id)
            .fetch_optional(pool)
            .await?;
        row.map(Self::try_from).transpose()
    }

    pub async fn find_by_session(pool: &SqlitePool, session_id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, PipelineExecutionRow>(
            "SELECT * FROM pipeline_executions WHERE session_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
        row.map(Self::try_from).transpose()
    }

    /// Only moves status forward if the row isn't already terminal, so a
    /// duplicate reconciliation pass can't regress a finished pipeline back
    /// to running. Always bumps `last_status_update`, even on a no-op
    /// transition.
    pub async fn update_status(pool: &SqlitePool, id: Uuid, status: PipelineStatus) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE pipeline_executions
               SET status = CASE WHEN status IN ('success', 'failed', 'canceled') THEN status ELSE ? END,
                   last_status_update = ?,
                   updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// In-flight executions for the pipeline monitor poll.
    pub async fn find_stale(pool: &SqlitePool, timeout_min: i64) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, PipelineExecutionRow>(
            r#"SELECT * FROM pipeline_executions
               WHERE status IN ('pending', 'running')
                 AND (last_status_update IS NULL OR last_status_update < datetime('now', ? || ' minutes'))"#,
        )
        .bind(format!("-{timeout_min}"))
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(Self::try_from).collect()
    }
}
