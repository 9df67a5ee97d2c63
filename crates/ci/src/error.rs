use thiserror::Error;

#[derive(Debug, Error)]
pub enum CiError {
    #[error("ci request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ci provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("ci response malformed: {0}")]
    Malformed(String),
}

impl CiError {
    /// Transport-level and 5xx failures are retriable; 4xx is terminal
    ///, except the `create_merge_request` 409-already-exists
    /// case, which callers treat as success rather than routing through this
    /// classifier at all.
    pub fn is_retryable(&self) -> bool {
        match self {
            CiError::Transport(_) => true,
            CiError::Status { status, .. } => *status >= 500,
            CiError::Malformed(_) => false,
        }
    }
}

pub type CiResult<T> = Result<T, CiError>;
