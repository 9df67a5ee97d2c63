use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use ops_core_broker::{Queue, SyncMessage};
use ops_core_db::models::task_source::{CreateTaskSource, TaskSource};
use ops_core_engine::SyncService;
use ops_core_utils::response::ApiResponse;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/task-sources", post(create_task_source))
        .route("/task-sources/{id}/sync", post(trigger_sync))
        .with_state(state)
}

async fn create_task_source(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskSource>,
) -> ApiResult<Json<ApiResponse<TaskSource>>> {
    let source = TaskSource::create(&state.pool, &body, Uuid::new_v4()).await?;

    let message = SyncMessage {
        task_source_id: source.id,
        provider: source.r#type.to_string(),
    };
    let meta = match state.broker.publish(Queue::TaskSync, &message).await {
        Ok(_) => serde_json::json!({
            "sync_triggered": true,
            "sync_message": "initial sync queued",
        }),
        Err(e) => serde_json::json!({
            "sync_triggered": false,
            "sync_message": format!("failed to queue initial sync: {e}"),
        }),
    };

    Ok(Json(ApiResponse::success_with_meta(source, meta)))
}

/// Direct-invocation path for `syncTaskSource`: runs the sync
/// synchronously in this request rather than going through the queue, so
/// the caller gets an immediate `{tasksPublished, errors}` report.
async fn trigger_sync(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ops_core_engine::SyncReport>>> {
    let secrets = state.secrets.as_ref();
    let service = SyncService::new(
        &state.pool,
        &state.broker,
        secrets,
        state.config.platform_config(),
        &state.oauth,
        state.config.jira_oauth_client_id.as_deref(),
        state.config.jira_oauth_client_secret.as_deref(),
    );
    let report = service.sync_task_source(id).await.map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(report)))
}
