use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use ops_core_engine::{CiClientFactory, PipelineMonitor, StuckTaskRecovery};
use ops_core_utils::response::ApiResponse;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/operations/check-stale-pipelines", post(check_stale_pipelines))
        .route("/admin/operations/recover-stuck-tasks", post(recover_stuck_tasks))
        .with_state(state)
}

async fn check_stale_pipelines(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<()>>> {
    let ci_factory = CiClientFactory::new(state.secrets.as_ref(), state.config.default_gitlab_host());
    let monitor = PipelineMonitor::new(&state.pool, ci_factory);
    monitor.run_once(state.config.pipeline_status_timeout_minutes).await?;
    Ok(Json(ApiResponse::success(())))
}

async fn recover_stuck_tasks(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<()>>> {
    let recovery = StuckTaskRecovery::new(&state.pool);
    recovery.run_once(state.config.stuck_evaluation_timeout_minutes).await?;
    Ok(Json(ApiResponse::success(())))
}
