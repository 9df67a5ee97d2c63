use std::sync::Arc;

use ops_core_broker::Broker;
use ops_core_db::SqlitePool;
use ops_core_engine::EngineConfig;
use ops_core_trackers::OAuthCoordinator;
use ops_core_utils::secrets::SecretsClient;

/// Shared handle threaded through every route's state.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub broker: Broker,
    pub secrets: Arc<dyn SecretsClient>,
    pub config: Arc<EngineConfig>,
    pub webhook_secrets: WebhookSecrets,
    pub oauth: OAuthCoordinator,
}

/// Shared-secret material for validating inbound webhook signatures
///. Each is optional: an unset secret means the provider
/// wasn't configured for this deployment and its webhook route always
/// rejects with 401 rather than silently accepting unsigned payloads.
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    pub gitlab: Option<String>,
    pub github: Option<String>,
    pub jira: Option<String>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        broker: Broker,
        secrets: Arc<dyn SecretsClient>,
        config: EngineConfig,
        webhook_secrets: WebhookSecrets,
    ) -> Self {
        Self {
            pool,
            broker,
            secrets,
            config: Arc::new(config),
            webhook_secrets,
            oauth: OAuthCoordinator::new(),
        }
    }
}
