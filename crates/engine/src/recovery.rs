use ops_core_db::models::pipeline_execution::{PipelineExecution, PipelineStatus};
use ops_core_db::models::task::{AdvancedStatus, Task};
use ops_core_db::SqlitePool;
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::monitor::sync_pipeline_status;

/// Recovers tasks wedged in `evaluating` past the stuck timeout. Strictly
/// additive: it only ever re-invokes the same status sync the pipeline
/// monitor uses, which is itself a no-op once a task has moved past
/// `evaluating` — recovery never overwrites a task that already advanced.
pub struct StuckTaskRecovery<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StuckTaskRecovery<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_once(&self, stuck_timeout_min: i64) -> EngineResult<()> {
        let stuck = Task::find_stuck_evaluating(self.pool, stuck_timeout_min).await?;
        info!(count = stuck.len(), "stuck-task recovery: candidates found");
        for task in stuck {
            if let Err(e) = self.recover(&task).await {
                warn!(task_id = %task.id, error = %e, "failed to recover stuck task");
            }
        }
        Ok(())
    }

    async fn recover(&self, task: &Task) -> EngineResult<()> {
        if task.advanced_status != AdvancedStatus::Evaluating {
            return Ok(());
        }

        let Some(session_id) = task.evaluation_session_id else {
            warn!(task_id = %task.id, "stuck task has no session, resetting to pending");
            Task::reset_advanced(self.pool, task.id).await?;
            return Ok(());
        };

        let Some(execution) = PipelineExecution::find_by_session(self.pool, session_id).await? else {
            warn!(task_id = %task.id, %session_id, "stuck task's session has no pipeline execution, resetting to pending");
            Task::reset_advanced(self.pool, task.id).await?;
            return Ok(());
        };

        match execution.status {
            PipelineStatus::Success => {
                sync_pipeline_status(self.pool, execution.id, PipelineStatus::Success).await?;
            }
            PipelineStatus::Failed => {
                sync_pipeline_status(self.pool, execution.id, PipelineStatus::Failed).await?;
            }
            PipelineStatus::Canceled => {
                sync_pipeline_status(self.pool, execution.id, PipelineStatus::Canceled).await?;
            }
            PipelineStatus::Pending | PipelineStatus::Running => {
                // Still in flight remotely; leave it for the pipeline
                // monitor to catch on its own schedule.
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use chrono::Utc;
    use ops_core_db::models::project::{CreateProject, Project};
    use ops_core_db::models::session::{Runner, Session};
    use ops_core_db::models::task::{AdvancedStatus, EvalVerdict, RemoteStatus, Task, UpsertOutcome, UpsertTask};
    use ops_core_db::models::task_source::{CreateTaskSource, TaskSource, TaskSourceType};
    use ops_core_db::models::worker_repository::WorkerRepository;
    use uuid::Uuid;

    use super::*;
    use crate::test_support::memory_pool;

    async fn make_task(pool: &SqlitePool) -> Task {
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

        let data = UpsertTask {
            project_id: project.id,
            task_source_id: source.id,
            unique_id: "gitlab-acme/widgets-9",
            title: "stuck task",
            description: None,
            remote_status: RemoteStatus::Opened,
            source_issue: &serde_json::json!({}),
        };
        match Task::upsert_from_issue(pool, &data).await.unwrap() {
            UpsertOutcome::Created(t) => t,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn task_stuck_with_no_session_resets_to_not_started() {
        let pool = memory_pool().await;
        let task = make_task(&pool).await;

        Task::set_simple_result(&pool, task.id, EvalVerdict::Ready, &serde_json::json!({})).await.unwrap();
        // `evaluating` without going through a session (shouldn't happen in
        // practice, but recovery must still make forward progress).
        sqlx::query("UPDATE tasks SET ai_evaluation_advanced_status = 'evaluating', updated_at = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::hours(2))
            .bind(task.id)
            .execute(&pool)
            .await
            .unwrap();

        let recovery = StuckTaskRecovery::new(&pool);
        recovery.run_once(60).await.unwrap();

        let reloaded = Task::require(&pool, task.id).await.unwrap();
        assert_eq!(reloaded.advanced_status, AdvancedStatus::NotStarted);
    }

    #[tokio::test]
    async fn task_stuck_with_pending_execution_is_left_alone() {
        let pool = memory_pool().await;
        let task = make_task(&pool).await;
        Task::set_simple_result(&pool, task.id, EvalVerdict::Ready, &serde_json::json!({})).await.unwrap();

        let worker_repo = WorkerRepository::create(&pool, task.project_id, &serde_json::json!({"project_id": "1"}))
            .await
            .unwrap();
        let session = Session::create(&pool, task.id, Runner::Evaluation).await.unwrap();
        Task::try_start_advanced(&pool, task.id, session.id).await.unwrap();
        PipelineExecution::create(&pool, session.id, worker_repo.id, "99").await.unwrap();

        sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::hours(2))
            .bind(task.id)
            .execute(&pool)
            .await
            .unwrap();

        let recovery = StuckTaskRecovery::new(&pool);
        recovery.run_once(60).await.unwrap();

        let reloaded = Task::require(&pool, task.id).await.unwrap();
        assert_eq!(reloaded.advanced_status, AdvancedStatus::Evaluating);
    }
}
