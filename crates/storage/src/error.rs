//! Storage-layer errors and their mapping onto the shared `DomainError`.

use assess_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("optimistic concurrency conflict: {0}")]
    ConcurrentUpdate(String),

    #[error("{0} already answered")]
    AlreadyAnswered(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound("row".to_string()),
            other => StorageError::Query(other),
        }
    }
}

impl From<StorageError> for DomainError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => DomainError::NotFound(what),
            StorageError::ConcurrentUpdate(msg) => DomainError::Conflict(msg),
            StorageError::AlreadyAnswered(msg) => DomainError::Conflict(msg),
            other => DomainError::Database(other.to_string()),
        }
    }
}
