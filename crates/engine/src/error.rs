use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Quota(#[from] crate::quota::SelectorError),
    #[error(transparent)]
    Store(#[from] ops_core_db::StoreError),
    #[error(transparent)]
    Broker(#[from] ops_core_broker::BrokerError),
    #[error(transparent)]
    Tracker(#[from] ops_core_trackers::TrackerError),
    #[error(transparent)]
    Ci(#[from] ops_core_ci::CiError),
    #[error(transparent)]
    Secrets(#[from] ops_core_utils::secrets::SecretsError),
}

pub type EngineResult<T> = Result<T, EngineError>;
