use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::StoreResult;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileSpace {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub r#type: String,
    pub enabled: bool,
    pub default_branch: Option<String>,
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileSpace {
    pub async fn find_by_project(pool: &SqlitePool, project_id: Uuid) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>("SELECT * FROM file_spaces WHERE project_id = ? AND enabled = 1")
            .bind(project_id)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    pub async fn create(
        pool: &SqlitePool,
        project_id: Uuid,
        name: &str,
        kind: &str,
        default_branch: Option<&str>,
        config: &serde_json::Value,
    ) -> StoreResult<Self> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO file_spaces (id, project_id, name, type, enabled, default_branch, config)
               VALUES (?, ?, ?, ?, 1, ?, ?)"#,
        )
        .bind(id)
        .bind(project_id)
        .bind(name)
        .bind(kind)
        .bind(default_branch)
        .bind(config.to_string())
        .execute(pool)
        .await?;

        Ok(sqlx::query_as::<_, Self>("SELECT * FROM file_spaces WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?)
    }
}
