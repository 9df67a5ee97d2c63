use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ops_core_db::models::secret::Secret;
use ops_core_db::SqlitePool;
use ops_core_utils::secrets::SecretsClient;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};

pub struct RefreshedTokens {
    pub access_token: String,
    pub new_refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Implemented once per provider that issues OAuth tokens.
#[async_trait]
pub trait OAuthRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> TrackerResult<RefreshedTokens>;
}

/// Serializes OAuth refreshes per secret id — "no two concurrent refreshes"
///. Holds one keyed, in-process mutex per secret; the lock
/// plus the read-modify-write against the store together form the critical
/// section.
#[derive(Clone, Default)]
pub struct OAuthCoordinator {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OAuthCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, secret_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(secret_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Returns the current plaintext access token for `secret_id`, refreshing
    /// it first if it has expired. The refreshed token (and rotated refresh
    /// token, if any) is written back before the caller proceeds to use it.
    pub async fn resolve_access_token(
        &self,
        pool: &SqlitePool,
        secrets: &dyn SecretsClient,
        refresher: &dyn OAuthRefresher,
        secret_id: Uuid,
    ) -> TrackerResult<String> {
        let lock = self.lock_for(secret_id);
        let _guard = lock.lock().await;

        let secret = Secret::require(pool, secret_id).await?;
        if !secret.is_expired() {
            return Ok(secrets.decrypt(&secret.ciphertext).await?);
        }

        let refresh_ciphertext = secret.refresh_ciphertext.as_deref().ok_or(TrackerError::MissingCredential)?;
        let refresh_token = secrets.decrypt(refresh_ciphertext).await?;

        info!(%secret_id, "refreshing expired oauth token");
        let refreshed = refresher.refresh(&refresh_token).await?;

        let new_ciphertext = secrets.put(&refreshed.access_token).await?;
        let new_refresh_ciphertext = match &refreshed.new_refresh_token {
            Some(token) => Some(secrets.put(token).await?),
            None => None,
        };

        Secret::update_oauth_tokens(
            pool,
            secret_id,
            &new_ciphertext,
            new_refresh_ciphertext.as_deref(),
            refreshed.expires_at,
        )
        .await?;

        Ok(refreshed.access_token)
    }
}
