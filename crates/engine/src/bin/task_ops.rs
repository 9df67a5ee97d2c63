use std::process::ExitCode;
use std::sync::Arc;

use ops_core_broker::Broker;
use ops_core_engine::{EngineConfig, Supervisor};
use ops_core_utils::secrets::AesGcmSecretsClient;

/// Single-process deployment mode: starts every runner —
/// the three queue consumers, both schedulers, the pipeline monitor and
/// stuck-task recovery — in one process, in a fixed order, and stops them
/// in reverse order on `SIGINT`/`SIGTERM`. Exit code 0 on clean shutdown,
/// 1 on any fatal init error.
#[tokio::main]
async fn main() -> ExitCode {
    let _sentry_guard = ops_core_utils::logging::init("micros-task-ops");

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
    let supervisor = Supervisor::new(pool, broker, secrets, config);

    match supervisor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "supervisor exited with error");
            ExitCode::FAILURE
        }
    }
}
