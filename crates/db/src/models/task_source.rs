use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskSourceType {
    GitlabIssues,
    GithubIssues,
    Jira,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Queued,
    Syncing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
struct TaskSourceRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    enabled: bool,
    r#type: String,
    config: String,
    sync_status: String,
    last_synced_at: Option<DateTime<Utc>>,
    last_sync_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSource {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub r#type: TaskSourceType,
    pub config: serde_json::Value,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TaskSourceRow> for TaskSource {
    type Error = StoreError;

    fn try_from(row: TaskSourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            enabled: row.enabled,
            r#type: row
                .r#type
                .parse()
                .map_err(|_| StoreError::Conflict("invalid task_source.type".into()))?,
            config: serde_json::from_str(&row.config).unwrap_or(serde_json::Value::Null),
            sync_status: row
                .sync_status
                .parse()
                .map_err(|_| StoreError::Conflict("invalid task_source.sync_status".into()))?,
            last_synced_at: row.last_synced_at,
            last_sync_error: row.last_sync_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskSource {
    pub project_id: Uuid,
    pub name: String,
    pub r#type: TaskSourceType,
    pub config: serde_json::Value,
}

impl TaskSource {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, TaskSourceRow>("SELECT * FROM task_sources WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(Self::try_from).transpose()
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound("task_source"))
    }

    pub async fn create(pool: &SqlitePool, data: &CreateTaskSource, id: Uuid) -> StoreResult<Self> {
        sqlx::query(
            r#"INSERT INTO task_sources (id, project_id, name, enabled, type, config, sync_status)
               VALUES (?, ?, ?, 1, ?, ?, 'pending')"#,
        )
        .bind(id)
        .bind(data.project_id)
        .bind(&data.name)
        .bind(data.r#type.to_string())
        .bind(data.config.to_string())
        .execute(pool)
        .await?;

        Self::require(pool, id).await
    }

    pub async fn set_sync_status(
        pool: &SqlitePool,
        id: Uuid,
        status: SyncStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE task_sources SET sync_status = ?, last_sync_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_synced(pool: &SqlitePool, id: Uuid, started_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE task_sources SET sync_status = 'completed', last_sync_error = NULL, last_synced_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(started_at)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Task sources that are stale (past `threshold_min` since last sync) or
    /// stuck in `queued|syncing` for longer than `queued_timeout_min`.
    /// Disabled sources and `manual` sources are never returned — manual
    /// sources are never synced at all.
    pub async fn find_needing_sync(
        pool: &SqlitePool,
        threshold_min: i64,
        queued_timeout_min: i64,
    ) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, TaskSourceRow>(
            r#"SELECT * FROM task_sources
               WHERE enabled = 1
                 AND type != 'manual'
                 AND (
                   last_synced_at IS NULL
                   OR last_synced_at < datetime('now', ? || ' minutes')
                   OR (
                     sync_status IN ('queued', 'syncing')
                     AND updated_at < datetime('now', ? || ' minutes')
                   )
                 )"#,
        )
        .bind(format!("-{threshold_min}"))
        .bind(format!("-{queued_timeout_min}"))
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Self::try_from).collect()
    }

    /// All enabled sources of a given type, for webhook ingress:
    /// the caller matches `config.repo`/`config.project_key` itself since
    /// that key differs per provider and `config` is an opaque blob here.
    pub async fn find_enabled_by_type(pool: &SqlitePool, r#type: TaskSourceType) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, TaskSourceRow>(
            "SELECT * FROM task_sources WHERE enabled = 1 AND type = ?",
        )
        .bind(r#type.to_string())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Self::try_from).collect()
    }
}
