use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkerRepository {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source: String,
    pub current_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM worker_repositories WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id).await?.ok_or(StoreError::NotFound("worker_repository"))
    }

    /// Exactly one per project; rebuilding requires deleting the row first.
    pub async fn find_by_project(pool: &SqlitePool, project_id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM worker_repositories WHERE project_id = ?")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn require_by_project(pool: &SqlitePool, project_id: Uuid) -> StoreResult<Self> {
        Self::find_by_project(pool, project_id)
            .await?
            .ok_or(StoreError::NotFound("worker_repository"))
    }

    pub async fn create(pool: &SqlitePool, project_id: Uuid, source: &serde_json::Value) -> StoreResult<Self> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO worker_repositories (id, project_id, source, current_version) VALUES (?, ?, ?, 0)",
        )
        .bind(id)
        .bind(project_id)
        .bind(source.to_string())
        .execute(pool)
        .await?;

        Self::require_by_project(pool, project_id).await
    }

    pub async fn bump_version(pool: &SqlitePool, id: Uuid) -> StoreResult<i64> {
        sqlx::query("UPDATE worker_repositories SET current_version = current_version + 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        let (version,): (i64,) =
            sqlx::query_as("SELECT current_version FROM worker_repositories WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await?;
        Ok(version)
    }

    fn source_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.source).unwrap_or(serde_json::Value::Null)
    }

    /// The remote (GitLab) numeric project id, distinct from `self.id` which
    /// is our own row id — CI calls must address the former.
    pub fn remote_project_id(&self) -> Option<String> {
        let value = self.source_json();
        value
            .get("project_id")
            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
    }

    pub fn host(&self) -> Option<String> {
        self.source_json().get("host").and_then(|v| v.as_str()).map(String::from)
    }

    pub fn access_token_ciphertext(&self) -> Option<String> {
        self.source_json()
            .get("access_token_ciphertext")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}
