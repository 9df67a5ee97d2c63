use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub job_executor_config: Option<serde_json::Value>,
    pub ai_provider_configs: Option<serde_json::Value>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub owner_user_id: Uuid,
    pub name: String,
    pub job_executor_config: Option<serde_json::Value>,
    pub ai_provider_configs: Option<serde_json::Value>,
}

impl Project {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound("project"))
    }

    pub async fn create(pool: &SqlitePool, data: &CreateProject, id: Uuid) -> StoreResult<Self> {
        let job_executor_config = data.job_executor_config.as_ref().map(ToString::to_string);
        let ai_provider_configs = data.ai_provider_configs.as_ref().map(ToString::to_string);

        sqlx::query(
            r#"INSERT INTO projects (id, owner_user_id, name, enabled, job_executor_config, ai_provider_configs)
               VALUES (?, ?, ?, 1, ?, ?)"#,
        )
        .bind(id)
        .bind(data.owner_user_id)
        .bind(&data.name)
        .bind(job_executor_config)
        .bind(ai_provider_configs)
        .execute(pool)
        .await?;

        Self::require(pool, id).await
    }

    pub async fn is_enabled(pool: &SqlitePool, id: Uuid) -> StoreResult<bool> {
        Ok(Self::require(pool, id).await?.enabled)
    }

    pub async fn set_last_synced_at(
        pool: &SqlitePool,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE projects SET last_synced_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
