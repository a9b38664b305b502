//! Engine-level errors and their mapping onto the shared `DomainError`.

use assess_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("session expired")]
    Expired,

    #[error("scorer unavailable: {0}")]
    ScorerUnavailable(String),

    #[error(transparent)]
    Storage(#[from] assess_storage::StorageError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<EngineError> for DomainError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => DomainError::Validation(msg),
            EngineError::Conflict(msg) => DomainError::Conflict(msg),
            EngineError::Expired => DomainError::Expired,
            EngineError::ScorerUnavailable(msg) => DomainError::ScorerUnavailable(msg),
            EngineError::Storage(e) => e.into(),
            EngineError::Internal(e) => DomainError::Internal(e),
        }
    }
}
