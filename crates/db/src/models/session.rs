use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Runner {
    Evaluation,
    Implementation,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub runner: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub async fn create(pool: &SqlitePool, task_id: Uuid, runner: Runner) -> StoreResult<Self> {
        Self::create_with_id(pool, Uuid::new_v4(), task_id, runner).await
    }

    /// Inserts a session under a caller-chosen id. Lets a caller generate the
    /// id up front, win a compare-and-swap gate with it, and only then
    /// persist the row — so a lost race never leaves an orphan session.
    pub async fn create_with_id(pool: &SqlitePool, id: Uuid, task_id: Uuid, runner: Runner) -> StoreResult<Self> {
        sqlx::query("INSERT INTO sessions (id, task_id, runner) VALUES (?, ?, ?)")
            .bind(id)
            .bind(task_id)
            .bind(runner.to_string())
            .execute(pool)
            .await?;

        Ok(sqlx::query_as::<_, Self>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        Ok(sqlx::query_as::<_, Self>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id).await?.ok_or(StoreError::NotFound("session"))
    }
}
