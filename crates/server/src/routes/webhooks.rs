use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use ops_core_broker::{Queue, SyncMessage};
use ops_core_db::models::task_source::{TaskSource, TaskSourceType};
use ops_core_utils::response::ApiResponse;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/gitlab", post(gitlab))
        .route("/webhooks/github", post(github))
        .route("/webhooks/jira", post(jira))
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct GitlabPayload {
    project: Option<GitlabProject>,
}

#[derive(serde::Deserialize)]
struct GitlabProject {
    path_with_namespace: String,
}

#[derive(serde::Deserialize)]
struct GithubPayload {
    repository: Option<GithubRepository>,
}

#[derive(serde::Deserialize)]
struct GithubRepository {
    full_name: String,
}

#[derive(serde::Deserialize)]
struct JiraPayload {
    #[serde(default)]
    issue: Option<JiraIssue>,
}

#[derive(serde::Deserialize)]
struct JiraIssue {
    fields: Option<JiraFields>,
}

#[derive(serde::Deserialize)]
struct JiraFields {
    project: Option<JiraProject>,
}

#[derive(serde::Deserialize)]
struct JiraProject {
    key: String,
}

/// Shared-secret compare via `X-Gitlab-Token`, constant-time.
async fn gitlab(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let configured = state
        .webhook_secrets
        .gitlab
        .as_ref()
        .ok_or_else(|| ApiError::Validation("gitlab webhooks are not configured for this deployment".into()))?;

    let provided = headers
        .get("X-Gitlab-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("missing X-Gitlab-Token header".into()))?;

    if !bool::from(configured.as_bytes().ct_eq(provided.as_bytes())) {
        return Err(ApiError::Validation("invalid webhook signature".into()));
    }

    let payload: GitlabPayload = serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let Some(project) = payload.project else {
        return Ok(Json(ApiResponse::success(serde_json::json!({ "matched": 0 }))));
    };

    let matched = publish_sync_for_matching_repo(&state, TaskSourceType::GitlabIssues, &project.path_with_namespace).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "matched": matched }))))
}

/// HMAC-SHA256 over the raw request body via `X-Hub-Signature-256`,
/// constant-time hex compare.
async fn github(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let configured = state
        .webhook_secrets
        .github
        .as_ref()
        .ok_or_else(|| ApiError::Validation("github webhooks are not configured for this deployment".into()))?;

    let signature_header = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("missing X-Hub-Signature-256 header".into()))?;
    let provided_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or_else(|| ApiError::Validation("malformed X-Hub-Signature-256 header".into()))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(configured.as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    mac.update(&body);
    let expected_hex = hex::encode(mac.finalize().into_bytes());

    if !bool::from(expected_hex.as_bytes().ct_eq(provided_hex.as_bytes())) {
        return Err(ApiError::Validation("invalid webhook signature".into()));
    }

    let payload: GithubPayload = serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let Some(repository) = payload.repository else {
        return Ok(Json(ApiResponse::success(serde_json::json!({ "matched": 0 }))));
    };

    let matched = publish_sync_for_matching_repo(&state, TaskSourceType::GithubIssues, &repository.full_name).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "matched": matched }))))
}

/// Jira sends no built-in signature; when a shared secret is configured for
/// this deployment it is expected as a bearer-style `X-Webhook-Secret`
/// header, otherwise the endpoint accepts unsigned payloads.
async fn jira(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    if let Some(configured) = &state.webhook_secrets.jira {
        let provided = headers
            .get("X-Webhook-Secret")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Validation("missing X-Webhook-Secret header".into()))?;
        if !bool::from(configured.as_bytes().ct_eq(provided.as_bytes())) {
            return Err(ApiError::Validation("invalid webhook signature".into()));
        }
    }

    let payload: JiraPayload = serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let Some(project_key) = payload.issue.and_then(|i| i.fields).and_then(|f| f.project).map(|p| p.key) else {
        return Ok(Json(ApiResponse::success(serde_json::json!({ "matched": 0 }))));
    };

    let matched = publish_sync_for_matching_repo(&state, TaskSourceType::Jira, &project_key).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "matched": matched }))))
}

/// Common tail of every webhook handler: find enabled sources of `kind`
/// whose `config.repo`/`config.project_key` matches `identifier`, and
/// publish a sync message for each.
async fn publish_sync_for_matching_repo(state: &AppState, kind: TaskSourceType, identifier: &str) -> ApiResult<usize> {
    let sources = TaskSource::find_enabled_by_type(&state.pool, kind).await?;
    let matching: Vec<&TaskSource> = sources
        .iter()
        .filter(|s| {
            s.config.get("repo").and_then(|v| v.as_str()) == Some(identifier)
                || s.config.get("project_key").and_then(|v| v.as_str()) == Some(identifier)
        })
        .collect();

    for source in &matching {
        let message = SyncMessage {
            task_source_id: source.id,
            provider: source.r#type.to_string(),
        };
        state.broker.publish(Queue::TaskSync, &message).await?;
    }

    Ok(matching.len())
}
