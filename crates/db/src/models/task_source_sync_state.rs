use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::StoreResult;

/// One row per issue ever seen for a task source, used to decide whether an
/// incoming issue is unchanged since the last sync.
pub struct TaskSourceSyncStateRow {
    pub issue_id: String,
    pub issue_updated_at: DateTime<Utc>,
}

pub struct TaskSourceSyncState;

impl TaskSourceSyncState {
    pub async fn load_all(
        pool: &SqlitePool,
        task_source_id: Uuid,
    ) -> StoreResult<Vec<TaskSourceSyncStateRow>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT issue_id, issue_updated_at FROM task_source_sync_state WHERE task_source_id = ?",
        )
        .bind(task_source_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(issue_id, issue_updated_at)| TaskSourceSyncStateRow {
                issue_id,
                issue_updated_at,
            })
            .collect())
    }

    /// Upserts sync-state watermarks for a batch of issues in a single
    /// transaction.
    pub async fn batch_upsert(
        pool: &SqlitePool,
        task_source_id: Uuid,
        rows: &[(String, DateTime<Utc>)],
    ) -> StoreResult<()> {
        let mut tx = pool.begin().await?;
        for (issue_id, issue_updated_at) in rows {
            sqlx::query(
                r#"INSERT INTO task_source_sync_state (task_source_id, issue_id, issue_updated_at)
                   VALUES (?, ?, ?)
                   ON CONFLICT (task_source_id, issue_id)
                   DO UPDATE SET issue_updated_at = excluded.issue_updated_at"#,
            )
            .bind(task_source_id)
            .bind(issue_id)
            .bind(issue_updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
