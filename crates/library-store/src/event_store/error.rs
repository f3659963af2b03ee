//! Store-local error type, translated into [`LibraryError`] at every public
//! boundary (the `AgentRegistryError -> WorkflowError` shape the teacher
//! uses for its own Postgres-backed registry).

use library_core::error::LibraryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    Concurrency {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("duplicate event for {aggregate_id} at version {version}")]
    Duplicate { aggregate_id: String, version: i64 },
}

impl From<StoreError> for LibraryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Concurrency {
                aggregate_id,
                expected,
                actual,
            } => LibraryError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            StoreError::Duplicate {
                aggregate_id,
                version,
            } => LibraryError::DuplicateEvent {
                aggregate_id,
                version,
            },
            StoreError::Serialization(e) => LibraryError::SerializationError {
                message: e.to_string(),
            },
            // r2d2 pool exhaustion and most diesel runtime errors are
            // connection-level and worth retrying; query-shape errors
            // (unique violations already routed above, bad SQL) are not,
            // but those are programmer errors we want to surface as-is.
            StoreError::Pool(e) => LibraryError::EventStoreUnavailable {
                message: e.to_string(),
            },
            StoreError::Join(e) => LibraryError::EventSaveFailed {
                message: format!("blocking task panicked: {e}"),
            },
            StoreError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            )) => LibraryError::EventSaveFailed {
                message: format!("unique constraint violated: {}", info.message()),
            },
            StoreError::Database(e) => LibraryError::EventRetrievalFailed {
                message: e.to_string(),
            },
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
