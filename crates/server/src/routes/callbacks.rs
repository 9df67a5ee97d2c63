use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use ops_core_db::models::pipeline_artifact::{ArtifactType, PipelineArtifact};
use ops_core_db::models::pipeline_execution::PipelineExecution;
use ops_core_utils::response::ApiResponse;
use subtle::ConstantTimeEq;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/callbacks/ci/artifacts", post(create_artifact))
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct ArtifactCallback {
    pipeline_id: String,
    artifact_type: ArtifactType,
    reference_url: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Lets the CI job report back an artifact (merge request, evaluation
/// text, ...) once it has produced one, authenticated via a bearer token
/// shared out of band with the pipeline trigger (`API_TOKEN`).
async fn create_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ArtifactCallback>,
) -> ApiResult<Json<ApiResponse<PipelineArtifact>>> {
    let configured = state
        .config
        .ci_callback_token
        .as_ref()
        .ok_or_else(|| ApiError::Validation("CI callbacks are not configured for this deployment".into()))?;

    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Validation("missing bearer token".into()))?;

    if !bool::from(configured.as_bytes().ct_eq(provided.as_bytes())) {
        return Err(ApiError::Validation("invalid callback token".into()));
    }

    let execution = PipelineExecution::find_by_pipeline_id(&state.pool, &payload.pipeline_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("pipeline_execution".into()))?;

    let artifact = PipelineArtifact::create(
        &state.pool,
        execution.id,
        payload.artifact_type,
        payload.reference_url.as_deref(),
        &payload.metadata,
    )
    .await?;

    Ok(Json(ApiResponse::success(artifact)))
}
