use axum::response::Json;
use axum::routing::get;
use axum::Router;
use ops_core_utils::response::ApiResponse;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health_check)).with_state(state)
}

async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}
