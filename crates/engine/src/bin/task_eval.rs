use std::process::ExitCode;
use std::sync::Arc;

use ops_core_broker::{Broker, Consumer, Queue};
use ops_core_engine::handlers::EvalHandler;
use ops_core_engine::{wait_for_shutdown_signal, EngineConfig, EvalScheduler};
use ops_core_utils::secrets::AesGcmSecretsClient;

/// Horizontally-scalable worker for the `task-eval` queue: runs the
/// consumer (simple + advanced evaluation, chained here) and the
/// eval scheduler. Exit code 0 on clean shutdown, 1 on any fatal init error.
#[tokio::main]
async fn main() -> ExitCode {
    let _sentry_guard = ops_core_utils::logging::init("micros-task-eval");

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

    let consumer_task = {
        let broker = broker.clone();
        let handler = EvalHandler::new(pool.clone(), secrets, platform_config, default_ci_host);
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { Consumer::new(broker, Queue::TaskEval, handler).run(&mut shutdown).await })
    };

    let scheduler_task = {
        let pool = pool.clone();
        let broker = broker.clone();
        let interval_minutes = config.eval_interval_minutes;
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { EvalScheduler::new(&pool, &broker, interval_minutes).run(&mut shutdown).await })
    };

    wait_for_shutdown_signal().await;
    tracing::info!("task-eval: shutdown signal received");
    let _ = shutdown_tx.send(true);

    let mut failed = false;
    match consumer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "task-eval consumer exited with error");
            failed = true;
        }
        Err(e) => {
            tracing::error!(error = %e, "task-eval consumer task panicked");
            failed = true;
        }
    }
    match scheduler_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "task-eval scheduler exited with error");
            failed = true;
        }
        Err(e) => {
            tracing::error!(error = %e, "task-eval scheduler task panicked");
            failed = true;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
