use serde::{Deserialize, Serialize};

/// Standard envelope wrapping every JSON response the server returns.
///
/// `meta` carries out-of-band signals such as `sync_triggered`/`sync_message`
/// (see the webhook/REST contract) without polluting the success payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    pub fn success_with_meta(data: T, meta: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(meta),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: None,
        }
    }

    pub fn with_quota_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.meta = Some(serde_json::json!({ "quota": snapshot }));
        self
    }
}
