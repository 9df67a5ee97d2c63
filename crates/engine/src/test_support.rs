#![cfg(test)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use ops_core_db::SqlitePool;
use ops_core_utils::secrets::{SecretsClient, SecretsError};

/// Fake secrets client for tests that don't exercise encryption itself —
/// `put`/`get` just round-trip the plaintext unchanged.
pub struct PassthroughSecrets;

#[async_trait]
impl SecretsClient for PassthroughSecrets {
    async fn put(&self, plaintext: &str) -> Result<String, SecretsError> {
        Ok(plaintext.to_string())
    }

    async fn get(&self, ciphertext: &str) -> Result<String, SecretsError> {
        Ok(ciphertext.to_string())
    }
}

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.expect("open pool");
    sqlx::migrate!("../db/migrations").run(&pool).await.expect("run migrations");
    pool
}
