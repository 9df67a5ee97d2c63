use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemoteStatus {
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvalVerdict {
    Ready,
    NeedsClarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SimpleStatus {
    Pending,
    Queued,
    Evaluating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdvancedStatus {
    NotStarted,
    Queued,
    Evaluating,
    Completed,
    Failed,
}

/// Implementation leaves `canceled` terminal rather than auto-retryable; see
/// the open question resolution in DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImplementationStatus {
    NotStarted,
    Queued,
    Implementing,
    Completed,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, FromRow)]
struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    task_source_id: Uuid,
    unique_id: String,
    title: String,
    description: Option<String>,
    remote_status: String,
    source_issue: String,
    ai_evaluation_simple_status: String,
    ai_evaluation_simple_verdict: Option<String>,
    ai_evaluation_simple_result: Option<String>,
    ai_evaluation_advanced_status: String,
    ai_evaluation_advanced_result: Option<String>,
    ai_evaluation_session_id: Option<Uuid>,
    ai_implementation_status: String,
    ai_implementation_session_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_source_id: Uuid,
    pub unique_id: String,
    pub title: String,
    pub description: Option<String>,
    pub remote_status: RemoteStatus,
    pub source_issue: serde_json::Value,
    pub simple_status: SimpleStatus,
    pub simple_verdict: Option<EvalVerdict>,
    pub simple_result: Option<serde_json::Value>,
    pub advanced_status: AdvancedStatus,
    pub advanced_result: Option<serde_json::Value>,
    pub advanced_verdict: Option<EvalVerdict>,
    pub evaluation_session_id: Option<Uuid>,
    pub implementation_status: ImplementationStatus,
    pub implementation_session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let advanced_result = row
            .ai_evaluation_advanced_result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e: serde_json::Error| StoreError::Conflict(e.to_string()))?;
        let advanced_verdict = advanced_result
            .as_ref()
            .and_then(|v: &serde_json::Value| v.get("is_ready"))
            .and_then(|v| v.as_bool())
            .map(|ready| {
                if ready {
                    EvalVerdict::Ready
                } else {
                    EvalVerdict::NeedsClarification
                }
            });

        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            task_source_id: row.task_source_id,
            unique_id: row.unique_id,
            title: row.title,
            description: row.description,
            remote_status: row
                .remote_status
                .parse()
                .map_err(|_| StoreError::Conflict("invalid task.remote_status".into()))?,
            source_issue: serde_json::from_str(&row.source_issue).unwrap_or(serde_json::Value::Null),
            simple_status: row
                .ai_evaluation_simple_status
                .parse()
                .map_err(|_| StoreError::Conflict("invalid task.simple_status".into()))?,
            simple_verdict: row
                .ai_evaluation_simple_verdict
                .and_then(|v| v.parse().ok()),
            simple_result: row
                .ai_evaluation_simple_result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e: serde_json::Error| StoreError::Conflict(e.to_string()))?,
            advanced_status: row
                .ai_evaluation_advanced_status
                .parse()
                .map_err(|_| StoreError::Conflict("invalid task.advanced_status".into()))?,
            advanced_result,
            advanced_verdict,
            evaluation_session_id: row.ai_evaluation_session_id,
            implementation_status: row
                .ai_implementation_status
                .parse()
                .map_err(|_| StoreError::Conflict("invalid task.implementation_status".into()))?,
            implementation_session_id: row.ai_implementation_session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct UpsertTask<'a> {
    pub project_id: Uuid,
    pub task_source_id: Uuid,
    pub unique_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub remote_status: RemoteStatus,
    pub source_issue: &'a serde_json::Value,
}

pub enum UpsertOutcome {
    Created(Task),
    Updated(Task),
    Unchanged(Task),
}

impl Task {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(Self::try_from).transpose()
    }

    pub async fn require(pool: &SqlitePool, id: Uuid) -> StoreResult<Self> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or(StoreError::NotFound("task"))
    }

    pub async fn find_by_unique_id(pool: &SqlitePool, unique_id: &str) -> StoreResult<Option<Self>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE unique_id = ?")
            .bind(unique_id)
            .fetch_optional(pool)
            .await?;
        row.map(Self::try_from).transpose()
    }

    /// Insert-or-refresh keyed by `unique_id`, reporting which branch was
    /// taken so the sync loop can decide whether to publish to the eval
    /// queue.
    pub async fn upsert_from_issue(pool: &SqlitePool, data: &UpsertTask<'_>) -> StoreResult<UpsertOutcome> {
        let mut tx = pool.begin().await?;

        let existing = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE unique_id = ?")
            .bind(data.unique_id)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"INSERT INTO tasks (id, project_id, task_source_id, unique_id, title, description, remote_status, source_issue)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(id)
                .bind(data.project_id)
                .bind(data.task_source_id)
                .bind(data.unique_id)
                .bind(data.title)
                .bind(data.description)
                .bind(data.remote_status.to_string())
                .bind(data.source_issue.to_string())
                .execute(&mut *tx)
                .await?;

                let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
                UpsertOutcome::Created(Task::try_from(row)?)
            }
            Some(row) if row.remote_status != data.remote_status.to_string()
                || row.title != data.title
                || row.description.as_deref() != data.description =>
            {
                sqlx::query(
                    r#"UPDATE tasks SET title = ?, description = ?, remote_status = ?, source_issue = ?, updated_at = ?
                       WHERE id = ?"#,
                )
                .bind(data.title)
                .bind(data.description)
                .bind(data.remote_status.to_string())
                .bind(data.source_issue.to_string())
                .bind(Utc::now())
                .bind(row.id)
                .execute(&mut *tx)
                .await?;

                let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
                    .bind(row.id)
                    .fetch_one(&mut *tx)
                    .await?;
                UpsertOutcome::Updated(Task::try_from(row)?)
            }
            Some(row) => UpsertOutcome::Unchanged(Task::try_from(row)?),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn close_by_remote(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE tasks SET remote_status = 'closed', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_simple_result(
        pool: &SqlitePool,
        id: Uuid,
        verdict: EvalVerdict,
        result: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE tasks SET ai_evaluation_simple_status = 'completed',
                   ai_evaluation_simple_verdict = ?, ai_evaluation_simple_result = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(verdict.to_string())
        .bind(result.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_simple_evaluating(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET ai_evaluation_simple_status = 'evaluating', updated_at = ? WHERE id = ? AND ai_evaluation_simple_status IN ('pending', 'queued')",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Compare-and-update transition into `evaluating`, the sanctioned
    /// concurrency primitive for the advanced-eval state machine.
    /// Returns `false` (no rows touched) if the task wasn't in a startable
    /// state — callers treat that as a no-op, keeping re-invocation of
    /// advanced evaluation idempotent.
    pub async fn try_start_advanced(pool: &SqlitePool, id: Uuid, session_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"UPDATE tasks SET ai_evaluation_advanced_status = 'evaluating', ai_evaluation_session_id = ?, updated_at = ?
               WHERE id = ?
                 AND ai_evaluation_advanced_status = 'not_started'
                 AND ai_evaluation_simple_status = 'completed'
                 AND ai_evaluation_simple_verdict = 'ready'"#,
        )
        .bind(session_id)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn complete_advanced(
        pool: &SqlitePool,
        id: Uuid,
        result: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE tasks SET ai_evaluation_advanced_status = 'completed', ai_evaluation_advanced_result = ?, updated_at = ?
               WHERE id = ? AND ai_evaluation_advanced_status = 'evaluating'"#,
        )
        .bind(result.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn fail_advanced(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET ai_evaluation_advanced_status = 'failed', updated_at = ? WHERE id = ? AND ai_evaluation_advanced_status = 'evaluating'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// `canceled` resets to `not_started`, making the pipeline retryable
    ///.
    pub async fn reset_advanced(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET ai_evaluation_advanced_status = 'not_started', ai_evaluation_session_id = NULL, updated_at = ? WHERE id = ? AND ai_evaluation_advanced_status = 'evaluating'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn try_start_implementation(pool: &SqlitePool, id: Uuid, session_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"UPDATE tasks SET ai_implementation_status = 'implementing', ai_implementation_session_id = ?, updated_at = ?
               WHERE id = ? AND ai_implementation_status IN ('not_started', 'failed')"#,
        )
        .bind(session_id)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_implementation_status(
        pool: &SqlitePool,
        id: Uuid,
        status: ImplementationStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE tasks SET ai_implementation_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Compare-and-update terminal transitions out of `implementing`,
    /// mirroring the advanced-evaluation transitions so a duplicate
    /// reconciliation pass is a no-op.
    pub async fn complete_implementation(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET ai_implementation_status = 'completed', updated_at = ? WHERE id = ? AND ai_implementation_status = 'implementing'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn fail_implementation(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET ai_implementation_status = 'failed', updated_at = ? WHERE id = ? AND ai_implementation_status = 'implementing'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Implementation `canceled` is left terminal rather than reset to
    /// `not_started` — see the open-question resolution in DESIGN.md.
    pub async fn cancel_implementation(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET ai_implementation_status = 'canceled', updated_at = ? WHERE id = ? AND ai_implementation_status = 'implementing'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Tasks whose `simple_status` is startable.
    pub async fn find_needing_evaluation(pool: &SqlitePool) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE remote_status = 'opened' AND ai_evaluation_simple_status = 'pending'",
        )
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(Self::try_from).collect()
    }

    /// Tasks stuck in `evaluating` past `timeout_min`, for stuck-task
    /// recovery.
    pub async fn find_stuck_evaluating(pool: &SqlitePool, timeout_min: i64) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"SELECT * FROM tasks
               WHERE ai_evaluation_advanced_status = 'evaluating'
                 AND updated_at < datetime('now', ? || ' minutes')"#,
        )
        .bind(format!("-{timeout_min}"))
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(Self::try_from).collect()
    }

    /// Tasks with `remote_status=opened` previously created by `task_source_id`,
    /// fed to the revalidation sweep.
    pub async fn find_open_by_source(pool: &SqlitePool, task_source_id: Uuid) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE task_source_id = ? AND remote_status = 'opened'",
        )
        .bind(task_source_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(Self::try_from).collect()
    }
}
