use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenType {
    Api,
    Oauth,
    Pat,
}

#[derive(Debug, Clone, FromRow)]
struct SecretRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    description: Option<String>,
    ciphertext: String,
    encryption_version: i64,
    token_type: Option<String>,
    oauth_provider: Option<String>,
    refresh_ciphertext: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    scopes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub ciphertext: String,
    pub encryption_version: i64,
    pub token_type: Option<TokenType>,
    pub oauth_provider: Option<String>,
    pub refresh_ciphertext: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SecretRow> for Secret {
    fn from(row: SecretRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            ciphertext: row.ciphertext,
            encryption_version: row.encryption_version,
            token_type: row.token_type.and_then(|t| t.parse().ok()),
            oauth_provider: row.oauth_provider,
            refresh_ciphertext: row.refresh_ciphertext,
            expires_at: row.expires_at,
            scopes: row
                .scopes
                .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Secret {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, SecretRow>("SELECT * FROM secrets WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Self::from))
    }

    pub async fn find_by_project_and_name(
        pool: &SqlitePool,
        project_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, SecretRow>(
            "SELECT * FROM secrets WHERE project_id = ? AND name = ?",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(Self::from))
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound("secret"))
    }

    /// Persist a refreshed OAuth token in place, atomically with respect to
    /// the per-secret advisory lock the caller holds (see tracker OAuth
    /// refresh coordination).
    pub async fn update_oauth_tokens(
        pool: &SqlitePool,
        id: Uuid,
        new_ciphertext: &str,
        new_refresh_ciphertext: Option<&str>,
        new_expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE secrets
               SET ciphertext = ?,
                   refresh_ciphertext = COALESCE(?, refresh_ciphertext),
                   expires_at = ?,
                   updated_at = ?
               WHERE id = ?"#,
        )
        .bind(new_ciphertext)
        .bind(new_refresh_ciphertext)
        .bind(new_expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}
