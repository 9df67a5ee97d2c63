use ops_core_ci::{CiClient, TriggerPipelineInput};
use ops_core_db::models::pipeline_execution::PipelineExecution;
use ops_core_db::models::project::Project;
use ops_core_db::models::session::{Runner, Session};
use ops_core_db::models::task::{AdvancedStatus, ImplementationStatus, Task};
use ops_core_db::models::user_quota::QuotaKind;
use ops_core_db::models::worker_repository::WorkerRepository;
use ops_core_db::SqlitePool;
use ops_core_utils::secrets::SecretsClient;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ci_factory::CiClientFactory;
use crate::error::{EngineError, EngineResult};
use crate::quota::Selector;

/// Drives the implementation phase: structurally identical to
/// the advanced-evaluation driver but runs `Runner::Implementation` and
/// expects merge-request artifacts once the pipeline lands.
pub struct ImplementationDriver<'a> {
    pool: &'a SqlitePool,
    secrets: &'a dyn SecretsClient,
    platform_config: Option<serde_json::Value>,
    ci_factory: CiClientFactory<'a>,
    api_base_url: Option<String>,
    ci_callback_token: Option<String>,
}

impl<'a> ImplementationDriver<'a> {
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
            ci_factory,
            api_base_url,
            ci_callback_token,
        }
    }

    /// Entry for `{taskId}` on the task-impl queue, or an explicit user
    /// action. A ready verdict from either evaluation phase is sufficient
    ///.
    pub async fn handle_task_impl(&self, task_id: Uuid) -> EngineResult<()> {
        let task = Task::require(self.pool, task_id).await?;

        let ready = task.advanced_verdict == Some(ops_core_db::models::task::EvalVerdict::Ready)
            || (task.advanced_status == AdvancedStatus::NotStarted
                && task.simple_verdict == Some(ops_core_db::models::task::EvalVerdict::Ready));
        if !ready {
            return Err(EngineError::InvariantViolation(
                "implementation requires a ready verdict from simple or advanced evaluation".into(),
            ));
        }

        if !matches!(
            task.implementation_status,
            ImplementationStatus::NotStarted | ImplementationStatus::Failed
        ) {
            info!(%task_id, status = ?task.implementation_status, "implementation already underway or terminal, skipping");
            return Ok(());
        }

        let project = Project::require(self.pool, task.project_id).await?;

        let selector = Selector::new(self.pool, self.secrets, self.platform_config.clone());
        let resolution = match selector.resolve(project.owner_user_id, &project, QuotaKind::Advanced).await {
            Ok(resolution) => resolution,
            Err(crate::quota::SelectorError::QuotaExceeded { .. }) => {
                info!(%task_id, "implementation quota exceeded, leaving task not_started");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let session_id = Uuid::new_v4();
        let started = Task::try_start_implementation(self.pool, task_id, session_id).await?;
        if !started {
            info!(%task_id, "implementation already in flight, skipping");
            return Ok(());
        }

        let session = Session::create_with_id(self.pool, session_id, task_id, Runner::Implementation).await?;

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

    /// Direct user-action entry ("Implement"); fails fast on precondition
    /// violations instead of swallowing.
    pub async fn trigger_manually(&self, task_id: Uuid) -> EngineResult<()> {
        let task = Task::require(self.pool, task_id).await?;
        let ready = task.advanced_verdict == Some(ops_core_db::models::task::EvalVerdict::Ready)
            || task.simple_verdict == Some(ops_core_db::models::task::EvalVerdict::Ready);
        if !ready {
            return Err(EngineError::InvariantViolation(
                "implementation requires a ready verdict from simple or advanced evaluation".into(),
            ));
        }
        if !matches!(
            task.implementation_status,
            ImplementationStatus::NotStarted | ImplementationStatus::Failed
        ) {
            warn!(%task_id, status = ?task.implementation_status, "implementation cannot be retriggered from this state");
            return Ok(());
        }
        self.handle_task_impl(task_id).await
    }
}
