use ops_core_db::models::project::Project;
use ops_core_db::models::user_quota::{QuotaKind, UserQuota};
use ops_core_db::SqlitePool;
use ops_core_utils::secrets::SecretsClient;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct QuotaSnapshot {
    pub used: i64,
    pub soft: i64,
    pub hard: i64,
}

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("quota exceeded for {kind:?}: {message}")]
    QuotaExceeded {
        kind: QuotaKind,
        snapshot: QuotaSnapshot,
        message: String,
    },
    #[error(transparent)]
    Store(#[from] ops_core_db::StoreError),
    #[error(transparent)]
    Secrets(#[from] ops_core_utils::secrets::SecretsError),
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub config: serde_json::Value,
    pub use_platform_token: bool,
    pub warning: Option<String>,
}

/// Resolves which Anthropic credential a request should use and whether the
/// caller may proceed at all. Usage is never incremented here —
/// callers increment after a successful simple evaluation, or before
/// triggering a remote advanced/implementation pipeline.
pub struct Selector<'a> {
    pool: &'a SqlitePool,
    secrets: &'a dyn SecretsClient,
    platform_config: Option<serde_json::Value>,
}

impl<'a> Selector<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        secrets: &'a dyn SecretsClient,
        platform_config: Option<serde_json::Value>,
    ) -> Self {
        Self {
            pool,
            secrets,
            platform_config,
        }
    }

    pub async fn resolve(
        &self,
        user_id: Uuid,
        project: &Project,
        kind: QuotaKind,
    ) -> Result<Resolution, SelectorError> {
        let quota = UserQuota::find_or_default(self.pool, user_id).await?;
        let snapshot = QuotaSnapshot {
            used: quota.used(kind),
            soft: match kind {
                QuotaKind::Simple => quota.simple_soft,
                QuotaKind::Advanced => quota.advanced_soft,
            },
            hard: quota.hard(kind),
        };

        if snapshot.used >= snapshot.hard {
            return self.resolve_project_config(project, kind, snapshot).await;
        }

        if let Some(platform_config) = &self.platform_config {
            if project.owner_user_id == user_id {
                let warning = (snapshot.used >= snapshot.soft).then(|| {
                    format!(
                        "approaching your {kind:?} evaluation cap ({used}/{hard})",
                        kind = kind,
                        used = snapshot.used,
                        hard = snapshot.hard
                    )
                });
                return Ok(Resolution {
                    config: platform_config.clone(),
                    use_platform_token: true,
                    warning,
                });
            }
        }

        self.resolve_project_config(project, kind, snapshot).await
    }

    async fn resolve_project_config(
        &self,
        project: &Project,
        kind: QuotaKind,
        snapshot: QuotaSnapshot,
    ) -> Result<Resolution, SelectorError> {
        let configs = project.ai_provider_configs.clone().ok_or_else(|| SelectorError::QuotaExceeded {
            kind,
            snapshot: snapshot.clone(),
            message: "configure an Anthropic credential for this project to continue".into(),
        })?;

        let anthropic = configs.get("anthropic").cloned().ok_or_else(|| SelectorError::QuotaExceeded {
            kind,
            snapshot: snapshot.clone(),
            message: "configure an Anthropic credential for this project to continue".into(),
        })?;

        let secret_ciphertext = anthropic
            .get("secret_ciphertext")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SelectorError::QuotaExceeded {
                kind,
                snapshot: snapshot.clone(),
                message: "project Anthropic credential is missing its secret reference".into(),
            })?;

        let plaintext = self.secrets.decrypt(secret_ciphertext).await?;
        let mut resolved = anthropic.clone();
        if let Some(obj) = resolved.as_object_mut() {
            obj.insert("api_key".into(), serde_json::Value::String(plaintext));
            obj.remove("secret_ciphertext");
        }

        Ok(Resolution {
            config: resolved,
            use_platform_token: false,
            warning: None,
        })
    }
}
