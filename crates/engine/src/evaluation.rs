use ops_core_ci::{CiClient, TriggerPipelineInput};
use ops_core_db::models::pipeline_execution::PipelineExecution;
use ops_core_db::models::project::Project;
use ops_core_db::models::session::{Runner, Session};
use ops_core_db::models::task::{EvalVerdict, Task};
use ops_core_db::models::user_quota::QuotaKind;
use ops_core_db::models::worker_repository::WorkerRepository;
use ops_core_db::SqlitePool;
use ops_core_utils::secrets::SecretsClient;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ci_factory::CiClientFactory;
use crate::error::{EngineError, EngineResult};
use crate::quota::{Selector, SelectorError};
use crate::simple_evaluator::{SimpleEvaluationInput, SimpleEvaluator};

/// Handles a `task-eval` queue delivery end to end: runs the simple
/// evaluator if it hasn't run yet, then — if the verdict is `ready` —
/// immediately starts the advanced (agentic) evaluation in the same
/// handler, since advanced evaluation requires simple evaluation to have
/// already completed.
pub struct EvaluationDriver<'a> {
    pool: &'a SqlitePool,
    secrets: &'a dyn SecretsClient,
    platform_config: Option<serde_json::Value>,
    simple_evaluator: SimpleEvaluator,
    ci_factory: CiClientFactory<'a>,
    api_base_url: Option<String>,
    ci_callback_token: Option<String>,
}

impl<'a> EvaluationDriver<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        secrets: &'a dyn SecretsClient,
        platform_config: Option<serde_json::Value>,
        ci_factory: CiClientFactory<'a>,
        api_base_url: Option<String>,
        ci_callback_token: Option<String>,
    ) -> Self {
        Self {
            pool,
            secrets,
            platform_config,
            simple_evaluator: SimpleEvaluator::new(),
            ci_factory,
            api_base_url,
            ci_callback_token,
        }
    }

    pub async fn handle_task_eval(&self, task_id: Uuid) -> EngineResult<()> {
        let task = Task::require(self.pool, task_id).await?;
        if task.remote_status == ops_core_db::models::task::RemoteStatus::Closed {
            return Ok(());
        }

        let task = if matches!(task.simple_status, ops_core_db::models::task::SimpleStatus::Pending | ops_core_db::models::task::SimpleStatus::Queued) {
            self.run_simple_evaluation(task).await?
        } else {
            task
        };

        if task.simple_status == ops_core_db::models::task::SimpleStatus::Completed
            && task.simple_verdict == Some(EvalVerdict::Ready)
            && task.advanced_status == ops_core_db::models::task::AdvancedStatus::NotStarted
        {
            self.start_advanced(task.id).await?;
        }

        Ok(())
    }

    async fn run_simple_evaluation(&self, task: Task) -> EngineResult<Task> {
        let project = Project::require(self.pool, task.project_id).await?;
        Task::mark_simple_evaluating(self.pool, task.id).await?;

        let selector = Selector::new(self.pool, self.secrets, self.platform_config.clone());
        let resolution = match selector.resolve(project.owner_user_id, &project, QuotaKind::Simple).await {
            Ok(resolution) => resolution,
            Err(SelectorError::QuotaExceeded { .. }) => {
                info!(task_id = %task.id, "simple quota exceeded, leaving task pending");
                return Task::require(self.pool, task.id).await.map_err(EngineError::Store);
            }
            Err(e) => return Err(e.into()),
        };

        let result = self
            .simple_evaluator
            .evaluate(
                SimpleEvaluationInput {
                    title: &task.title,
                    description: task.description.as_deref(),
                },
                &resolution.config,
            )
            .await
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        if resolution.use_platform_token {
            // Quota increments happen after a successful in-process request
            //.
            ops_core_db::models::user_quota::UserQuota::increment_usage(self.pool, project.owner_user_id, QuotaKind::Simple)
                .await?;
        }

        let verdict = if result.should_evaluate {
            EvalVerdict::Ready
        } else {
            EvalVerdict::NeedsClarification
        };

        Task::set_simple_result(self.pool, task.id, verdict, &serde_json::to_value(&result).unwrap_or_default())
            .await?;

        Task::require(self.pool, task.id).await.map_err(EngineError::Store)
    }

    /// Compare-and-update into `evaluating`; a concurrent or duplicate
    /// delivery that loses the race is a no-op.
    async fn start_advanced(&self, task_id: Uuid) -> EngineResult<()> {
        let task = Task::require(self.pool, task_id).await?;
        let project = Project::require(self.pool, task.project_id).await?;

        let selector = Selector::new(self.pool, self.secrets, self.platform_config.clone());
        let resolution = match selector.resolve(project.owner_user_id, &project, QuotaKind::Advanced).await {
            Ok(resolution) => resolution,
            Err(SelectorError::QuotaExceeded { .. }) => {
                info!(task_id = %task_id, "advanced quota exceeded, leaving task not_started");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let session_id = Uuid::new_v4();
        let started = Task::try_start_advanced(self.pool, task_id, session_id).await?;
        if !started {
            info!(task_id = %task_id, "advanced evaluation already in flight, skipping");
            return Ok(());
        }

        let session = Session::create_with_id(self.pool, session_id, task_id, Runner::Evaluation).await?;

        // Quota increments happen before triggering remote work to avoid
        // oversubscribing the cap while the pipeline is in flight.
        if resolution.use_platform_token {
            ops_core_db::models::user_quota::UserQuota::increment_usage(self.pool, project.owner_user_id, QuotaKind::Advanced)
                .await?;
        }

        let worker_repo = WorkerRepository::require_by_project(self.pool, project.id).await?;
        let remote_project_id = CiClientFactory::remote_project_id(&worker_repo)?;
        let ci_client = self.ci_factory.for_worker_repository(&worker_repo).await?;
        let mut variables = vec![
            ("TASK_ID".into(), task_id.to_string()),
            ("SESSION_ID".into(), session.id.to_string()),
            ("PROVIDER_CONFIG".into(), resolution.config.to_string()),
        ];
        if let Some(api_base_url) = &self.api_base_url {
            variables.push(("API_BASE_URL".into(), api_base_url.clone()));
        }
        if let Some(token) = &self.ci_callback_token {
            variables.push(("API_TOKEN".into(), token.clone()));
        }
        let pipeline = ci_client
            .trigger_pipeline(&remote_project_id, TriggerPipelineInput { git_ref: "main".into(), variables })
            .await?;

        PipelineExecution::create(self.pool, session.id, worker_repo.id, &pipeline.id.to_string()).await?;

        Ok(())
    }

    /// Direct user-action entry ("Run advanced evaluation"); same
    /// precondition checks as the queue path, fails fast instead of
    /// swallowing.
    pub async fn trigger_advanced_manually(&self, task_id: Uuid) -> EngineResult<()> {
        let task = Task::require(self.pool, task_id).await?;
        if task.simple_status != ops_core_db::models::task::SimpleStatus::Completed
            || task.simple_verdict != Some(EvalVerdict::Ready)
        {
            return Err(EngineError::InvariantViolation(
                "advanced evaluation requires simple_status=completed and simple_verdict=ready".into(),
            ));
        }
        if task.advanced_status != ops_core_db::models::task::AdvancedStatus::NotStarted {
            warn!(%task_id, "advanced evaluation already underway, ignoring duplicate trigger");
            return Ok(());
        }
        self.start_advanced(task_id).await
    }
}
