use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use ops_core_broker::Broker;
use ops_core_engine::EngineConfig;
use ops_core_server::state::{AppState, WebhookSecrets};
use ops_core_utils::secrets::AesGcmSecretsClient;

/// REST boundary process: task-source/task/admin endpoints and
/// tracker webhook ingress. Out of scope here is auth/authz
/// middleware and the browser UI; this binary only wires the routes that
/// call back into the engine.
#[tokio::main]
async fn main() -> ExitCode {
    let _sentry_guard = ops_core_utils::logging::init("ops-core-server");

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let pool = match ops_core_db::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    let secrets: Arc<dyn ops_core_utils::secrets::SecretsClient> = match AesGcmSecretsClient::new(&config.encryption_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize secrets client");
            return ExitCode::FAILURE;
        }
    };

    let broker = Broker::new(pool.clone());
    let webhook_secrets = WebhookSecrets {
        gitlab: env::var("GITLAB_WEBHOOK_SECRET").ok(),
        github: env::var("GITHUB_WEBHOOK_SECRET").ok(),
        jira: env::var("JIRA_WEBHOOK_SECRET").ok(),
    };
    let state = AppState::new(pool, broker, secrets, config, webhook_secrets);

    let app = ops_core_server::routes::router(state);
    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%addr, "ops-core-server listening");
    match axum::serve(listener, app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
