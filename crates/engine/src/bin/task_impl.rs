use std::process::ExitCode;
use std::sync::Arc;

use ops_core_broker::{Broker, Consumer, Queue};
use ops_core_engine::handlers::ImplHandler;
use ops_core_engine::{wait_for_shutdown_signal, EngineConfig};
use ops_core_utils::secrets::AesGcmSecretsClient;

/// Horizontally-scalable worker for the `task-impl` queue. Unlike sync and
/// eval, implementation is only ever enqueued by the eval driver or a
/// direct API call, so this binary runs the consumer alone, no scheduler.
/// Exit code 0 on clean shutdown, 1 on any fatal init error.
#[tokio::main]
async fn main() -> ExitCode {
    let _sentry_guard = ops_core_utils::logging::init("micros-task-impl");

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
    let platform_config = config.platform_config();
    let default_ci_host = config.default_gitlab_host();

    let (shutdown_tx, _) = tokio::sync::watch::channel(false);
    let mut shutdown = shutdown_tx.subscribe();

    let handler = ImplHandler::new(pool, secrets, platform_config, default_ci_host);
    let consumer_task = tokio::spawn(async move { Consumer::new(broker, Queue::TaskImpl, handler).run(&mut shutdown).await });

    wait_for_shutdown_signal().await;
    tracing::info!("task-impl: shutdown signal received");
    let _ = shutdown_tx.send(true);

    match consumer_task.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "task-impl consumer exited with error");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "task-impl consumer task panicked");
            ExitCode::FAILURE
        }
    }
}
