use thiserror::Error;

/// Typed error surface for every store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
