use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactType {
    MergeRequest,
    Issue,
    Branch,
    Commit,
    ExecutionResult,
    Text,
    TaskEvaluation,
    TaskImplementation,
}

#[derive(Debug, Clone, FromRow)]
struct PipelineArtifactRow {
    id: Uuid,
    pipeline_execution_id: Uuid,
    artifact_type: String,
    reference_url: Option<String>,
    metadata: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub id: Uuid,
    pub pipeline_execution_id: Uuid,
    pub artifact_type: ArtifactType,
    pub reference_url: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PipelineArtifactRow> for PipelineArtifact {
    type Error = StoreError;

    fn try_from(row: PipelineArtifactRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            pipeline_execution_id: row.pipeline_execution_id,
            artifact_type: row
                .artifact_type
                .parse()
                .map_err(|_| StoreError::Conflict("invalid pipeline_artifact.artifact_type".into()))?,
            reference_url: row.reference_url,
            metadata: serde_json::from_str(&row.metadata).unwrap_or(serde_json::Value::Null),
            created_at: row.created_at,
        })
    }
}

impl PipelineArtifact {
    pub async fn create(
        pool: &SqlitePool,
        pipeline_execution_id: Uuid,
        artifact_type: ArtifactType,
        reference_url: Option<&str>,
        metadata: &serde_json::Value,
    ) -> StoreResult<Self> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO pipeline_artifacts (id, pipeline_execution_id, artifact_type, reference_url, metadata)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(pipeline_execution_id)
        .bind(artifact_type.to_string())
        .bind(reference_url)
        .bind(metadata.to_string())
        .execute(pool)
        .await?;

        let row = sqlx::query_as::<_, PipelineArtifactRow>("SELECT * FROM pipeline_artifacts WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Self::try_from(row)
    }

    pub async fn find_by_execution(pool: &SqlitePool, pipeline_execution_id: Uuid) -> StoreResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, PipelineArtifactRow>(
            "SELECT * FROM pipeline_artifacts WHERE pipeline_execution_id = ?",
        )
        .bind(pipeline_execution_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(Self::try_from).collect()
    }

    /// Finds the `text` artifact carrying the evaluation verdict for
    /// `task_id`.
    pub async fn find_evaluation_text(
        pool: &SqlitePool,
        pipeline_execution_id: Uuid,
        task_id: Uuid,
    ) -> StoreResult<Option<Self>> {
        let artifacts = Self::find_by_execution(pool, pipeline_execution_id).await?;
        Ok(artifacts.into_iter().find(|a| {
            a.artifact_type == ArtifactType::Text
                && a.metadata.get("task_id").and_then(|v| v.as_str()) == Some(task_id.to_string().as_str())
        }))
    }

    pub async fn find_merge_requests(pool: &SqlitePool, pipeline_execution_id: Uuid) -> StoreResult<Vec<Self>> {
        let artifacts = Self::find_by_execution(pool, pipeline_execution_id).await?;
        Ok(artifacts
            .into_iter()
            .filter(|a| a.artifact_type == ArtifactType::MergeRequest)
            .collect())
    }
}
