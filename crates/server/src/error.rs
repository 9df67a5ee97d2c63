use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use ops_core_broker::BrokerError;
use ops_core_ci::CiError;
use ops_core_db::StoreError;
use ops_core_engine::{EngineError, SelectorError};
use ops_core_trackers::TrackerError;
use ops_core_utils::response::ApiResponse;
use ops_core_utils::secrets::SecretsError;

/// Maps every inner error enum onto an HTTP status: validation and
/// invariant violations are 400, missing entities are 404, exhausted quota
/// is 429 carrying the usage snapshot, exhausted external retries are 502,
/// everything else is an opaque 500 logged at `error`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation(String),
    QuotaExceeded { message: String, snapshot: serde_json::Value },
    Upstream(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "not found: {msg}"),
            ApiError::Validation(msg) => write!(f, "validation failed: {msg}"),
            ApiError::QuotaExceeded { message, .. } => write!(f, "quota exceeded: {message}"),
            ApiError::Upstream(msg) => write!(f, "upstream failure: {msg}"),
            ApiError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiResponse::<()>::error(msg.clone())),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, ApiResponse::<()>::error(msg.clone())),
            ApiError::QuotaExceeded { message, snapshot } => (
                StatusCode::TOO_MANY_REQUESTS,
                ApiResponse::<()>::error(message.clone()).with_quota_snapshot(snapshot.clone()),
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, ApiResponse::<()>::error(msg.clone())),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiResponse::<()>::error("internal error"))
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what.to_string()),
            StoreError::Conflict(msg) => ApiError::Validation(msg),
            StoreError::Other(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SelectorError> for ApiError {
    fn from(e: SelectorError) -> Self {
        match e {
            SelectorError::QuotaExceeded { message, snapshot, .. } => ApiError::QuotaExceeded {
                message,
                snapshot: serde_json::json!({
                    "used": snapshot.used,
                    "soft": snapshot.soft,
                    "hard": snapshot.hard,
                }),
            },
            SelectorError::Store(e) => ApiError::from(e),
            SelectorError::Secrets(e) => ApiError::from(e),
        }
    }
}

impl From<SecretsError> for ApiError {
    fn from(e: SecretsError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::Http(inner) => ApiError::Upstream(inner.to_string()),
            TrackerError::Malformed(msg) => ApiError::Upstream(msg),
            TrackerError::MissingCredential => ApiError::Validation("no usable credential for this task source".into()),
            TrackerError::Secrets(e) => ApiError::from(e),
            TrackerError::Store(e) => ApiError::from(e),
        }
    }
}

impl From<CiError> for ApiError {
    fn from(e: CiError) -> Self {
        if e.is_retryable() {
            ApiError::Upstream(e.to_string())
        } else {
            ApiError::Validation(e.to_string())
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => ApiError::Validation(msg),
            EngineError::InvariantViolation(msg) => ApiError::Validation(msg),
            EngineError::Quota(e) => ApiError::from(e),
            EngineError::Store(e) => ApiError::from(e),
            EngineError::Broker(e) => ApiError::from(e),
            EngineError::Tracker(e) => ApiError::from(e),
            EngineError::Ci(e) => ApiError::from(e),
            EngineError::Secrets(e) => ApiError::from(e),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
