use std::sync::Arc;
use std::time::Duration;

use ops_core_broker::{Broker, Consumer, Queue};
use ops_core_db::SqlitePool;
use ops_core_utils::secrets::SecretsClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ci_factory::CiClientFactory;
use crate::config::EngineConfig;
use crate::handlers::{EvalHandler, ImplHandler, SyncHandler};
use crate::monitor::PipelineMonitor;
use crate::recovery::StuckTaskRecovery;
use crate::scheduler::{EvalScheduler, SyncScheduler};

/// Starts and stops every runner in the process: three queue
/// consumers, two schedulers, the pipeline monitor and stuck-task recovery
/// loops. Runners start in a fixed order and stop in the reverse order on
/// shutdown; an unhandled error from any runner is logged and that runner
/// exits, but does not bring down the others — the supervisor itself only
/// returns once every runner has stopped.
pub struct Supervisor {
    pool: SqlitePool,
    broker: Broker,
    secrets: Arc<dyn SecretsClient>,
    config: EngineConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(pool: SqlitePool, broker: Broker, secrets: Arc<dyn SecretsClient>, config: EngineConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pool,
            broker,
            secrets,
            config,
            shutdown_tx,
        }
    }

    /// Runs every component until a shutdown signal (SIGINT/SIGTERM, or the
    /// ctrl-c equivalent on platforms without SIGTERM) arrives, then waits
    /// for all runners to stop in reverse start order.
    pub async fn run(&self) -> anyhow::Result<()> {
        let platform_config = self.config.platform_config();
        let default_ci_host = self.config.default_gitlab_host();

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        info!("supervisor: starting task-sync consumer");
        handles.push(("task-sync consumer", self.spawn_consumer(
            Queue::TaskSync,
            SyncHandler::new(
                self.pool.clone(),
                self.broker.clone(),
                self.secrets.clone(),
                platform_config.clone(),
                self.config.jira_oauth_client_id.clone(),
                self.config.jira_oauth_client_secret.clone(),
            ),
        )));

        info!("supervisor: starting task-eval consumer");
        handles.push(("task-eval consumer", self.spawn_consumer(
            Queue::TaskEval,
            EvalHandler::new(
                self.pool.clone(),
                self.secrets.clone(),
                platform_config.clone(),
                default_ci_host.clone(),
                self.config.api_base_url.clone(),
                self.config.ci_callback_token.clone(),
            ),
        )));

        info!("supervisor: starting task-impl consumer");
        handles.push(("task-impl consumer", self.spawn_consumer(
            Queue::TaskImpl,
            ImplHandler::new(
                self.pool.clone(),
                self.secrets.clone(),
                platform_config.clone(),
                default_ci_host.clone(),
                self.config.api_base_url.clone(),
                self.config.ci_callback_token.clone(),
            ),
        )));

        info!("supervisor: starting sync scheduler");
        handles.push(("sync scheduler", self.spawn_sync_scheduler()));

        info!("supervisor: starting eval scheduler");
        handles.push(("eval scheduler", self.spawn_eval_scheduler()));

        info!("supervisor: starting pipeline monitor");
        handles.push(("pipeline monitor", self.spawn_pipeline_monitor(default_ci_host.clone())));

        info!("supervisor: starting stuck-task recovery");
        handles.push(("stuck-task recovery", self.spawn_stuck_task_recovery()));

        wait_for_shutdown_signal().await;
        info!("supervisor: shutdown signal received, stopping runners");
        let _ = self.shutdown_tx.send(true);

        for (label, handle) in handles.into_iter().rev() {
            if let Err(e) = handle.await {
                error!(runner = label, error = %e, "runner task panicked");
            }
        }

        info!("supervisor: all runners stopped");
        Ok(())
    }

    fn spawn_consumer<H: ops_core_broker::Handler>(&self, queue: Queue, handler: H) -> JoinHandle<()> {
        let broker = self.broker.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let consumer = Consumer::new(broker, queue, handler);
            if let Err(e) = consumer.run(&mut shutdown).await {
                error!(%queue, error = %e, "consumer exited with error");
            }
        })
    }

    fn spawn_sync_scheduler(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let broker = self.broker.clone();
        let interval_minutes = self.config.task_sync_interval_minutes;
        let threshold_minutes = self.config.task_sync_threshold_minutes;
        let queued_timeout_minutes = self.config.task_queued_timeout_minutes;
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let scheduler = SyncScheduler::new(&pool, &broker, interval_minutes, threshold_minutes, queued_timeout_minutes);
            if let Err(e) = scheduler.run(&mut shutdown).await {
                error!(error = %e, "sync scheduler exited with error");
            }
        })
    }

    fn spawn_eval_scheduler(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let broker = self.broker.clone();
        let interval_minutes = self.config.eval_interval_minutes;
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let scheduler = EvalScheduler::new(&pool, &broker, interval_minutes);
            if let Err(e) = scheduler.run(&mut shutdown).await {
                error!(error = %e, "eval scheduler exited with error");
            }
        })
    }

    fn spawn_pipeline_monitor(&self, default_ci_host: String) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let secrets = self.secrets.clone();
        let poll_interval = self.config.pipeline_poll_interval();
        let timeout_minutes = self.config.pipeline_status_timeout_minutes;
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("pipeline monitor stopping");
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let ci_factory = CiClientFactory::new(secrets.as_ref(), default_ci_host.clone());
                        let monitor = PipelineMonitor::new(&pool, ci_factory);
                        if let Err(e) = monitor.run_once(timeout_minutes).await {
                            warn!(error = %e, "pipeline monitor pass failed");
                        }
                    }
                }
            }
        })
    }

    fn spawn_stuck_task_recovery(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let check_interval_minutes = self.config.stuck_eval_check_interval_minutes;
        let stuck_timeout_minutes = self.config.stuck_evaluation_timeout_minutes;
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(check_interval_minutes.max(1) as u64 * 60));
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("stuck-task recovery stopping");
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let recovery = StuckTaskRecovery::new(&pool);
                        if let Err(e) = recovery.run_once(stuck_timeout_minutes).await {
                            warn!(error = %e, "stuck-task recovery pass failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());
    let (mut sigterm, mut sigint) = match (sigterm, sigint) {
        (Ok(term), Ok(int)) => (term, int),
        (term, int) => {
            error!(
                sigterm_ok = term.is_ok(),
                sigint_ok = int.is_ok(),
                "failed to install a unix signal handler, falling back to ctrl-c only"
            );
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
