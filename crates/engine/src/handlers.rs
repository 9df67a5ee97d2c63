use std::sync::Arc;

use async_trait::async_trait;
use ops_core_broker::{Broker, Delivery, EvalMessage, Handler, ImplMessage, SyncMessage};
use ops_core_db::SqlitePool;
use ops_core_trackers::OAuthCoordinator;
use ops_core_utils::secrets::SecretsClient;

use crate::ci_factory::CiClientFactory;
use crate::evaluation::EvaluationDriver;
use crate::implementation::ImplementationDriver;
use crate::sync::SyncService;

/// Bridges a `task-sync` delivery to [`SyncService`]. Owns its dependencies
/// by value (the pool and broker are cheap handles; secrets is shared via
/// `Arc`) so it satisfies [`Handler`]'s `'static` bound. The `OAuthCoordinator`
/// is held for the lifetime of the handler (not rebuilt per delivery) so its
/// per-secret locks actually serialize concurrent refreshes.
pub struct SyncHandler {
    pool: SqlitePool,
    broker: Broker,
    secrets: Arc<dyn SecretsClient>,
    platform_config: Option<serde_json::Value>,
    oauth: OAuthCoordinator,
    jira_oauth_client_id: Option<String>,
    jira_oauth_client_secret: Option<String>,
}

impl SyncHandler {
    pub fn new(
        pool: SqlitePool,
        broker: Broker,
        secrets: Arc<dyn SecretsClient>,
        platform_config: Option<serde_json::Value>,
        jira_oauth_client_id: Option<String>,
        jira_oauth_client_secret: Option<String>,
    ) -> Self {
        Self {
            pool,
            broker,
            secrets,
            platform_config,
            oauth: OAuthCoordinator::new(),
            jira_oauth_client_id,
            jira_oauth_client_secret,
        }
    }
}

#[async_trait]
impl Handler for SyncHandler {
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let message: SyncMessage = serde_json::from_value(delivery.payload.clone())?;
        let service = SyncService::new(
            &self.pool,
            &self.broker,
            self.secrets.as_ref(),
            self.platform_config.clone(),
            &self.oauth,
            self.jira_oauth_client_id.as_deref(),
            self.jira_oauth_client_secret.as_deref(),
        );
        service.sync_task_source(message.task_source_id).await?;
        Ok(())
    }
}

pub struct EvalHandler {
    pool: SqlitePool,
    secrets: Arc<dyn SecretsClient>,
    platform_config: Option<serde_json::Value>,
    default_ci_host: String,
    api_base_url: Option<String>,
    ci_callback_token: Option<String>,
}

impl EvalHandler {
    pub fn new(
        pool: SqlitePool,
        secrets: Arc<dyn SecretsClient>,
        platform_config: Option<serde_json::Value>,
        default_ci_host: String,
        api_base_url: Option<String>,
        ci_callback_token: Option<String>,
    ) -> Self {
        Self {
            pool,
            secrets,
            platform_config,
            default_ci_host,
            api_base_url,
            ci_callback_token,
        }
    }
}

#[async_trait]
impl Handler for EvalHandler {
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let message: EvalMessage = serde_json::from_value(delivery.payload.clone())?;
        let ci_factory = CiClientFactory::new(self.secrets.as_ref(), self.default_ci_host.clone());
        let driver = EvaluationDriver::new(
            &self.pool,
            self.secrets.as_ref(),
            self.platform_config.clone(),
            ci_factory,
            self.api_base_url.clone(),
            self.ci_callback_token.clone(),
        );
        driver.handle_task_eval(message.task_id).await?;
        Ok(())
    }
}

pub struct ImplHandler {
    pool: SqlitePool,
    secrets: Arc<dyn SecretsClient>,
    platform_config: Option<serde_json::Value>,
    default_ci_host: String,
    api_base_url: Option<String>,
    ci_callback_token: Option<String>,
}

impl ImplHandler {
    pub fn new(
        pool: SqlitePool,
        secrets: Arc<dyn SecretsClient>,
        platform_config: Option<serde_json::Value>,
        default_ci_host: String,
        api_base_url: Option<String>,
        ci_callback_token: Option<String>,
    ) -> Self {
        Self {
            pool,
            secrets,
            platform_config,
            default_ci_host,
            api_base_url,
            ci_callback_token,
        }
    }
}

#[async_trait]
impl Handler for ImplHandler {
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let message: ImplMessage = serde_json::from_value(delivery.payload.clone())?;
        let ci_factory = CiClientFactory::new(self.secrets.as_ref(), self.default_ci_host.clone());
        let driver = ImplementationDriver::new(
            &self.pool,
            self.secrets.as_ref(),
            self.platform_config.clone(),
            ci_factory,
            self.api_base_url.clone(),
            self.ci_callback_token.clone(),
        );
        driver.handle_task_impl(message.task_id).await?;
        Ok(())
    }
}
