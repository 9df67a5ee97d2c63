use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use ops_core_engine::{CiClientFactory, EvaluationDriver, ImplementationDriver};
use ops_core_utils::response::ApiResponse;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks/{id}/evaluate", post(evaluate))
        .route("/tasks/{id}/evaluate-advanced", post(evaluate_advanced))
        .route("/tasks/{id}/implement", post(implement))
        .with_state(state)
}

async fn evaluate(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ApiResponse<()>>> {
    let secrets = state.secrets.as_ref();
    let ci_factory = CiClientFactory::new(secrets, state.config.default_gitlab_host());
    let driver = EvaluationDriver::new(
        &state.pool,
        secrets,
        state.config.platform_config(),
        ci_factory,
        state.config.api_base_url.clone(),
        state.config.ci_callback_token.clone(),
    );
    driver.handle_task_eval(id).await?;
    Ok(Json(ApiResponse::success(())))
}

async fn evaluate_advanced(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ApiResponse<()>>> {
    let secrets = state.secrets.as_ref();
    let ci_factory = CiClientFactory::new(secrets, state.config.default_gitlab_host());
    let driver = EvaluationDriver::new(
        &state.pool,
        secrets,
        state.config.platform_config(),
        ci_factory,
        state.config.api_base_url.clone(),
        state.config.ci_callback_token.clone(),
    );
    driver.trigger_advanced_manually(id).await?;
    Ok(Json(ApiResponse::success(())))
}

async fn implement(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ApiResponse<()>>> {
    let secrets = state.secrets.as_ref();
    let ci_factory = CiClientFactory::new(secrets, state.config.default_gitlab_host());
    let driver = ImplementationDriver::new(
        &state.pool,
        secrets,
        state.config.platform_config(),
        ci_factory,
        state.config.api_base_url.clone(),
        state.config.ci_callback_token.clone(),
    );
    driver.trigger_manually(id).await?;
    Ok(Json(ApiResponse::success(())))
}
