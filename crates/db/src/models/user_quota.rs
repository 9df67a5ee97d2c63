use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Simple,
    Advanced,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserQuota {
    pub user_id: Uuid,
    pub simple_used: i64,
    pub simple_soft: i64,
    pub simple_hard: i64,
    pub advanced_used: i64,
    pub advanced_soft: i64,
    pub advanced_hard: i64,
    pub updated_at: DateTime<Utc>,
}

impl UserQuota {
    pub async fn find_or_default(pool: &SqlitePool, user_id: Uuid) -> StoreResult<Self> {
        if let Some(row) = sqlx::query_as::<_, Self>("SELECT * FROM user_quotas WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
        {
            return Ok(row);
        }

        sqlx::query("INSERT OR IGNORE INTO user_quotas (user_id) VALUES (?)")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(sqlx::query_as::<_, Self>("SELECT * FROM user_quotas WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?)
    }

    pub fn used(&self, kind: QuotaKind) -> i64 {
        match kind {
            QuotaKind::Simple => self.simple_used,
            QuotaKind::Advanced => self.advanced_used,
        }
    }

    pub fn hard(&self, kind: QuotaKind) -> i64 {
        match kind {
            QuotaKind::Simple => self.simple_hard,
            QuotaKind::Advanced => self.advanced_hard,
        }
    }

    pub fn has_capacity(&self, kind: QuotaKind) -> bool {
        self.used(kind) < self.hard(kind)
    }

    /// Unconditional increment; callers must check `has_capacity` first
    ///.
    pub async fn increment_usage(pool: &SqlitePool, user_id: Uuid, kind: QuotaKind) -> StoreResult<()> {
        let column = match kind {
            QuotaKind::Simple => "simple_used",
            QuotaKind::Advanced => "advanced_used",
        };
        Self::find_or_default(pool, user_id).await?;
        sqlx::query(&format!(
            "UPDATE user_quotas SET {column} = {column} + 1, updated_at = ? WHERE user_id = ?"
        ))
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
