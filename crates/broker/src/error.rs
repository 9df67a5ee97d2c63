use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("message not found")]
    NotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
