use ops_core_db::models::pipeline_artifact::PipelineArtifact;
use ops_core_db::models::pipeline_execution::{PipelineExecution, PipelineStatus};
use ops_core_db::models::session::{Runner, Session};
use ops_core_db::models::task::{AdvancedStatus, ImplementationStatus, Task};
use ops_core_db::models::worker_repository::WorkerRepository;
use ops_core_db::SqlitePool;
use ops_core_ci::CiClient;
use uuid::Uuid;
use tracing::{info, warn};

use crate::ci_factory::CiClientFactory;
use crate::error::{EngineError, EngineResult};

fn to_pipeline_status(status: ops_core_ci::CiStatus) -> PipelineStatus {
    // Both enums share the same snake_case variant names by construction
    // (ops_core_ci::CiStatus documents itself as a mirror of this type).
    status
        .to_string()
        .parse()
        .unwrap_or(PipelineStatus::Pending)
}

/// Periodic reconciler pulling stale in-flight CI pipelines and mapping
/// their remote status onto local state.
pub struct PipelineMonitor<'a> {
    pool: &'a SqlitePool,
    ci_factory: CiClientFactory<'a>,
}

impl<'a> PipelineMonitor<'a> {
    pub fn new(pool: &'a SqlitePool, ci_factory: CiClientFactory<'a>) -> Self {
        Self { pool, ci_factory }
    }

    pub async fn run_once(&self, timeout_minutes: i64) -> EngineResult<()> {
        let stale = PipelineExecution::find_stale(self.pool, timeout_minutes).await?;
        info!(count = stale.len(), "pipeline monitor: stale executions found");
        for execution in stale {
            if let Err(e) = self.reconcile(&execution).await {
                warn!(execution_id = %execution.id, error = %e, "failed to reconcile pipeline execution");
            }
        }
        Ok(())
    }

    async fn reconcile(&self, execution: &PipelineExecution) -> EngineResult<()> {
        let worker_repo = WorkerRepository::require(self.pool, execution.worker_repository_id).await?;
        let remote_project_id = CiClientFactory::remote_project_id(&worker_repo)?;
        let ci_client = self.ci_factory.for_worker_repository(&worker_repo).await?;

        let pipeline = ci_client.get_pipeline(&remote_project_id, &execution.pipeline_id).await?;
        let mapped = to_pipeline_status(pipeline.mapped_status());

        // Always bumps `last_status_update`, even when `mapped` matches the
        // recorded status — this is what lets a second, no-op monitor pass
        // stay a no-op on task state while still refreshing staleness.
        PipelineExecution::update_status(self.pool, execution.id, mapped).await?;

        if mapped.is_terminal() {
            sync_pipeline_status(self.pool, execution.id, mapped).await?;
        }

        Ok(())
    }
}

/// Shared by the pipeline monitor and stuck-task recovery: given an
/// execution and its newly-observed terminal status, advances whichever
/// task is attached to its session. Idempotent — re-running on the same
/// `(execution, status)` after the task has already moved past the
/// in-flight state is a no-op.
pub async fn sync_pipeline_status(pool: &SqlitePool, execution_id: Uuid, status: PipelineStatus) -> EngineResult<()> {
    let execution = PipelineExecution::require(pool, execution_id).await?;
    let session = match Session::find_by_id(pool, execution.session_id).await? {
        Some(session) => session,
        None => return Ok(()),
    };
    let Some(task_id) = session.task_id else {
        return Ok(());
    };
    let task = Task::require(pool, task_id).await?;

    let runner: Runner = session
        .runner
        .parse()
        .map_err(|_| EngineError::Validation("session.runner is not a recognized runner kind".into()))?;

    match runner {
        Runner::Evaluation => sync_evaluation_status(pool, &task, execution_id, status).await,
        Runner::Implementation => sync_implementation_status(pool, &task, execution_id, status).await,
    }
}

/// Evaluation branch.
async fn sync_evaluation_status(
    pool: &SqlitePool,
    task: &Task,
    execution_id: Uuid,
    status: PipelineStatus,
) -> EngineResult<()> {
    if task.advanced_status != AdvancedStatus::Evaluating {
        return Ok(());
    }

    match status {
        PipelineStatus::Success => {
            let result = match PipelineArtifact::find_evaluation_text(pool, execution_id, task.id).await? {
                Some(artifact) if artifact.metadata.get("is_ready").is_some() => artifact.metadata,
                Some(artifact) => {
                    warn!(task_id = %task.id, "evaluation artifact missing is_ready, completing without a verdict");
                    artifact.metadata
                }
                None => {
                    warn!(task_id = %task.id, "evaluation pipeline succeeded with no verdict artifact");
                    serde_json::json!({})
                }
            };
            Task::complete_advanced(pool, task.id, &result).await?;
        }
        PipelineStatus::Failed => Task::fail_advanced(pool, task.id).await?,
        PipelineStatus::Canceled => Task::reset_advanced(pool, task.id).await?,
        PipelineStatus::Pending | PipelineStatus::Running => {}
    }
    Ok(())
}

/// Implementation branch: on success the
/// reconciler expects `merge_request` artifacts from the in-CI
/// push-to-file-spaces step; zero artifacts is still `completed`, just
/// flagged via a warning log rather than failed.
async fn sync_implementation_status(
    pool: &SqlitePool,
    task: &Task,
    execution_id: Uuid,
    status: PipelineStatus,
) -> EngineResult<()> {
    if task.implementation_status != ImplementationStatus::Implementing {
        return Ok(());
    }

    match status {
        PipelineStatus::Success => {
            let merge_requests = PipelineArtifact::find_merge_requests(pool, execution_id).await?;
            if merge_requests.is_empty() {
                warn!(task_id = %task.id, "implementation pipeline succeeded with zero merge request artifacts");
            }
            Task::complete_implementation(pool, task.id).await?;
        }
        PipelineStatus::Failed => Task::fail_implementation(pool, task.id).await?,
        PipelineStatus::Canceled => Task::cancel_implementation(pool, task.id).await?,
        PipelineStatus::Pending | PipelineStatus::Running => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use ops_core_db::models::project::{CreateProject, Project};
    use ops_core_db::models::task::{EvalVerdict, RemoteStatus, SimpleStatus, Task, UpsertOutcome, UpsertTask};
    use ops_core_db::models::task_source::{CreateTaskSource, TaskSource, TaskSourceType};
    use ops_core_db::models::worker_repository::WorkerRepository;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::{memory_pool, PassthroughSecrets};

    async fn setup_evaluating_task(pool: &SqlitePool, gitlab_host: &str) -> (Task, WorkerRepository) {
        let project = Project::create(
            pool,
            &CreateProject {
                owner_user_id: Uuid::new_v4(),
                name: "demo".into(),
                job_executor_config: None,
                ai_provider_configs: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let source = TaskSource::create(
            pool,
            &CreateTaskSource {
                project_id: project.id,
                name: "gitlab".into(),
                r#type: TaskSourceType::GitlabIssues,
                config: serde_json::json!({"repo": "acme/widgets"}),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let worker_repo = WorkerRepository::create(
            pool,
            project.id,
            &serde_json::json!({
                "project_id": "42",
                "host": gitlab_host,
                "access_token_ciphertext": "token-plaintext",
            }),
        )
        .await
        .unwrap();

        let data = UpsertTask {
            project_id: project.id,
            task_source_id: source.id,
            unique_id: "gitlab-acme/widgets-1",
            title: "do the thing",
            description: None,
            remote_status: RemoteStatus::Opened,
            source_issue: &serde_json::json!({}),
        };
        let task = match Task::upsert_from_issue(pool, &data).await.unwrap() {
            UpsertOutcome::Created(t) => t,
            _ => unreachable!(),
        };

        Task::set_simple_result(pool, task.id, EvalVerdict::Ready, &serde_json::json!({"should_evaluate": true}))
            .await
            .unwrap();
        assert_eq!(
            Task::require(pool, task.id).await.unwrap().simple_status,
            SimpleStatus::Completed
        );

        let session = ops_core_db::models::session::Session::create(pool, task.id, ops_core_db::models::session::Runner::Evaluation)
            .await
            .unwrap();
        let started = Task::try_start_advanced(pool, task.id, session.id).await.unwrap();
        assert!(started);

        PipelineExecution::create(pool, session.id, worker_repo.id, "7").await.unwrap();

        (Task::require(pool, task.id).await.unwrap(), worker_repo)
    }

    #[tokio::test]
    async fn reconcile_completes_evaluation_on_remote_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42/pipelines/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7, "status": "success"})))
            .mount(&server)
            .await;

        let pool = memory_pool().await;
        let (task, _worker_repo) = setup_evaluating_task(&pool, &server.uri()).await;

        let secrets = PassthroughSecrets;
        let ci_factory = CiClientFactory::new(&secrets, server.uri());
        let monitor = PipelineMonitor::new(&pool, ci_factory);

        monitor.run_once(0).await.unwrap();

        let reloaded = Task::require(&pool, task.id).await.unwrap();
        assert_eq!(reloaded.advanced_status, AdvancedStatus::Completed);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_on_second_pass() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42/pipelines/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7, "status": "success"})))
            .mount(&server)
            .await;

        let pool = memory_pool().await;
        setup_evaluating_task(&pool, &server.uri()).await;

        let secrets = PassthroughSecrets;
        let ci_factory = CiClientFactory::new(&secrets, server.uri());
        let monitor = PipelineMonitor::new(&pool, ci_factory);

        monitor.run_once(0).await.unwrap();
        // The execution is now terminal, so `find_stale` no longer returns it
        // and a second pass touches nothing.
        monitor.run_once(0).await.unwrap();
    }
}
