//! Bus-local error type, translated into [`LibraryError`] at every public
//! boundary (the same `StoreError -> LibraryError` shape the store crate
//! uses).

use library_core::error::LibraryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("the bus has not been initialized; call init() first")]
    NotInitialized,

    #[error("message could not be routed: {reason}")]
    Unroutable { reason: String },

    #[error("reconnection failed after {attempts} consecutive attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl From<BusError> for LibraryError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Unroutable { reason } => LibraryError::Unroutable { message: reason },
            BusError::ReconnectExhausted { .. } | BusError::NotInitialized => LibraryError::BusUnavailable {
                message: err.to_string(),
            },
            BusError::Amqp(e) => LibraryError::BusUnavailable { message: e.to_string() },
            BusError::Serialization(e) => LibraryError::SerializationError { message: e.to_string() },
        }
    }
}

pub type BusResult<T> = Result<T, BusError>;
