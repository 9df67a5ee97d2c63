use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tracker response malformed: {0}")]
    Malformed(String),
    #[error("no usable credential for this task source")]
    MissingCredential,
    #[error(transparent)]
    Secrets(#[from] ops_core_utils::secrets::SecretsError),
    #[error(transparent)]
    Store(#[from] ops_core_db::StoreError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
