pub mod admin;
pub mod callbacks;
pub mod health;
pub mod task_sources;
pub mod tasks;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(task_sources::router(state.clone()))
        .merge(tasks::router(state.clone()))
        .merge(admin::router(state.clone()))
        .merge(webhooks::router(state.clone()))
        .merge(callbacks::router(state))
}
