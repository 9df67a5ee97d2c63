use chrono::Utc;
use ops_core_broker::{Broker, EvalMessage, Queue};
use ops_core_db::models::project::Project;
use ops_core_db::models::task::{RemoteStatus, Task, UpsertOutcome, UpsertTask};
use ops_core_db::models::task_source::{SyncStatus, TaskSource, TaskSourceType};
use ops_core_db::models::user_quota::QuotaKind;
use ops_core_db::SqlitePool;
use ops_core_trackers::{Issue, IssueState, OAuthCoordinator};
use ops_core_utils::secrets::SecretsClient;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::quota::Selector;
use crate::tracker_factory::{build_adapter, JiraOAuthCredentials};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SyncReport {
    pub tasks_published: i64,
    pub tasks_created: i64,
    pub errors: Vec<String>,
}

struct UpsertAndPublishOutcome {
    created: bool,
    published: bool,
}

pub struct SyncService<'a> {
    pool: &'a SqlitePool,
    broker: &'a Broker,
    secrets: &'a dyn SecretsClient,
    platform_config: Option<serde_json::Value>,
    oauth: &'a OAuthCoordinator,
    jira_oauth_client_id: Option<&'a str>,
    jira_oauth_client_secret: Option<&'a str>,
}

impl<'a> SyncService<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        broker: &'a Broker,
        secrets: &'a dyn SecretsClient,
        platform_config: Option<serde_json::Value>,
        oauth: &'a OAuthCoordinator,
        jira_oauth_client_id: Option<&'a str>,
        jira_oauth_client_secret: Option<&'a str>,
    ) -> Self {
        Self {
            pool,
            broker,
            secrets,
            platform_config,
            oauth,
            jira_oauth_client_id,
            jira_oauth_client_secret,
        }
    }

    fn jira_oauth_credentials(&self) -> Option<JiraOAuthCredentials<'a>> {
        Some(JiraOAuthCredentials {
            client_id: self.jira_oauth_client_id?,
            client_secret: self.jira_oauth_client_secret?,
        })
    }

    /// Entry point for both the queue consumer and direct API invocation
    ///. Mirrors the exact 8-step algorithm.
    pub async fn sync_task_source(&self, task_source_id: Uuid) -> EngineResult<SyncReport> {
        let start_time = Utc::now();
        TaskSource::set_sync_status(self.pool, task_source_id, SyncStatus::Syncing, None).await?;

        let source = TaskSource::require(self.pool, task_source_id).await?;
        let project = Project::require(self.pool, source.project_id).await?;

        if !source.enabled || !project.enabled || source.r#type == TaskSourceType::Manual {
            let reason = "task source or project disabled, or source is manual".to_string();
            TaskSource::set_sync_status(self.pool, task_source_id, SyncStatus::Failed, Some(&reason)).await?;
            return Ok(SyncReport {
                errors: vec![reason],
                ..Default::default()
            });
        }

        let adapter = match build_adapter(self.pool, self.secrets, &source, self.oauth, self.jira_oauth_credentials()).await {
            Ok(adapter) => adapter,
            Err(e) => {
                let reason = e.to_string();
                TaskSource::set_sync_status(self.pool, task_source_id, SyncStatus::Failed, Some(&reason)).await?;
                return Err(EngineError::Tracker(e));
            }
        };

        let issues = match adapter.list_issues().await {
            Ok(issues) => issues,
            Err(e) => {
                let reason = e.to_string();
                error!(%task_source_id, error = %reason, "full issue listing failed");
                TaskSource::set_sync_status(self.pool, task_source_id, SyncStatus::Failed, Some(&reason)).await?;
                return Err(EngineError::Tracker(e));
            }
        };

        let mut report = SyncReport::default();
        let mut sync_state_rows = Vec::with_capacity(issues.len());

        for issue in &issues {
            match self.upsert_and_maybe_publish(&source, &project, issue).await {
                Ok(outcome) => {
                    if outcome.created {
                        report.tasks_created += 1;
                    }
                    if outcome.published {
                        report.tasks_published += 1;
                    }
                }
                Err(e) => report.errors.push(format!("issue {}: {e}", issue.unique_id)),
            }
            sync_state_rows.push((issue.id.clone(), issue.updated_at));
        }

        if let Err(e) = ops_core_db::models::task_source_sync_state::TaskSourceSyncState::batch_upsert(
            self.pool,
            task_source_id,
            &sync_state_rows,
        )
        .await
        {
            report.errors.push(e.to_string());
        }

        TaskSource::mark_synced(self.pool, task_source_id, start_time).await?;

        if matches!(source.r#type, TaskSourceType::GitlabIssues | TaskSourceType::GithubIssues) {
            if let Err(e) = self.revalidation_sweep(task_source_id, adapter.as_ref()).await {
                report.errors.push(format!("revalidation sweep: {e}"));
            }
        }

        Ok(report)
    }

    /// Upserts one issue and publishes a simple-eval message when the issue
    /// is new or changed and quota allows it. `created` tracks the new-task
    /// case independent of whether the eval publish went through, since a
    /// quota-exhausted new task is still a task the sync created.
    async fn upsert_and_maybe_publish(
        &self,
        source: &TaskSource,
        project: &Project,
        issue: &Issue,
    ) -> EngineResult<UpsertAndPublishOutcome> {
        let remote_status = match issue.state {
            IssueState::Opened => RemoteStatus::Opened,
            IssueState::Closed => RemoteStatus::Closed,
        };

        let data = UpsertTask {
            project_id: source.project_id,
            task_source_id: source.id,
            unique_id: &issue.unique_id,
            title: &issue.title,
            description: issue.description.as_deref(),
            remote_status,
            source_issue: &issue.metadata,
        };

        let outcome = Task::upsert_from_issue(self.pool, &data).await?;
        let (created, task) = match outcome {
            UpsertOutcome::Unchanged(_) => {
                return Ok(UpsertAndPublishOutcome {
                    created: false,
                    published: false,
                })
            }
            UpsertOutcome::Created(task) => (true, task),
            UpsertOutcome::Updated(task) => (false, task),
        };

        let selector = Selector::new(self.pool, self.secrets, self.platform_config.clone());
        let published = match selector.resolve(project.owner_user_id, project, QuotaKind::Simple).await {
            Ok(_resolution) => {
                self.broker
                    .publish(Queue::TaskEval, &EvalMessage { task_id: task.id })
                    .await?;
                true
            }
            Err(crate::quota::SelectorError::QuotaExceeded { .. }) => {
                info!(task_id = %task.id, "quota exceeded for simple evaluation, task stays pending");
                false
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "could not resolve provider config for simple evaluation");
                false
            }
        };

        Ok(UpsertAndPublishOutcome { created, published })
    }

    async fn revalidation_sweep(
        &self,
        task_source_id: Uuid,
        adapter: &dyn ops_core_trackers::TrackerAdapter,
    ) -> EngineResult<()> {
        let open_tasks = Task::find_open_by_source(self.pool, task_source_id).await?;
        if open_tasks.is_empty() {
            return Ok(());
        }

        // `unique_id` is "{provider}-{repo-or-project}-{iid}"; the trailing
        // segment is always the provider-scoped issue number we revalidate.
        let iids: Vec<String> = open_tasks
            .iter()
            .filter_map(|t| t.unique_id.rsplit('-').next().map(String::from))
            .collect();

        let revalidated = adapter.revalidate(&iids).await?;

        for fresh in revalidated {
            if fresh.state != IssueState::Closed {
                continue;
            }
            if let Some(task) = open_tasks.iter().find(|t| t.unique_id == fresh.unique_id) {
                Task::close_by_remote(self.pool, task.id).await.map_err(EngineError::Store)?;
            }
        }
        Ok(())
    }
}
