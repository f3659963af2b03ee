//! # Error Types for the Library Event-Sourcing Substrate
//!
//! All operations across the event store, aggregates, projections, and bus
//! return variants of [`LibraryError`]. Each variant carries enough context
//! to reconstruct the HTTP status code a thin web layer would emit (spec
//! §6/§7) without this crate depending on an HTTP framework.
//!
//! ## Error Categories
//!
//! - Validation / state-machine errors are permanent and never retried.
//! - Concurrency conflicts are retried a bounded number of times by the
//!   event store's `append_batch`, then surfaced.
//! - Infra errors (store unavailable, bus unavailable) are transient and
//!   retried with capped exponential backoff by their callers.

use thiserror::Error;

/// Primary error type for the library substrate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LibraryError {
    /// Schema or domain precondition failed (400).
    #[error("validation error: {message}")]
    ValidationError { message: String },

    /// Aggregate of the given kind/id does not exist (404).
    #[error("{aggregate} not found: {id}")]
    NotFound { aggregate: String, id: String },

    /// Aggregate was already soft-deleted (410).
    #[error("{aggregate} {id} already deleted")]
    AlreadyDeleted { aggregate: String, id: String },

    /// A command was rejected by the aggregate's state-transition guard (400).
    #[error("{aggregate} cannot transition to {target} from {from}")]
    InvalidTransition {
        aggregate: String,
        from: String,
        target: String,
    },

    /// Optimistic concurrency violation on `saveEvents` (409).
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    /// Unique `(aggregateId, version)` violation (409).
    #[error("duplicate event for aggregate {aggregate_id} at version {version}")]
    DuplicateEvent { aggregate_id: String, version: i64 },

    /// `rehydrate` was given a stream that doesn't start with a `*_CREATED` event,
    /// or whose versions are non-contiguous.
    #[error("invalid event stream: {message}")]
    InvalidEventStream { message: String },

    /// Transient storage failure (connection reset, timeout, primary step-down).
    #[error("event store unavailable: {message}")]
    EventStoreUnavailable { message: String },

    /// Non-transient failure while persisting events.
    #[error("event save failed: {message}")]
    EventSaveFailed { message: String },

    /// Non-transient failure while reading events.
    #[error("event retrieval failed: {message}")]
    EventRetrievalFailed { message: String },

    /// Failure to (de)serialize an event payload or envelope.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// The bus connection/channel could not be established or was lost
    /// beyond the reconnect cap.
    #[error("event bus unavailable: {message}")]
    BusUnavailable { message: String },

    /// Message published with `mandatory=true` could not be routed and the
    /// broker returned it (surfaced only when the alternate-exchange path
    /// itself fails).
    #[error("message unroutable: {message}")]
    Unroutable { message: String },

    /// Catch-all for unexpected internal failures.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl LibraryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(aggregate: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            aggregate: aggregate.into(),
            id: id.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable error code, as named throughout spec §7.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyDeleted { .. } => "ALREADY_DELETED",
            Self::InvalidTransition { .. } => "STATE_TRANSITION_REJECTED",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::DuplicateEvent { .. } => "DUPLICATE_EVENT",
            Self::InvalidEventStream { .. } => "INVALID_EVENT_STREAM",
            Self::EventStoreUnavailable { .. } => "EVENT_STORE_UNAVAILABLE",
            Self::EventSaveFailed { .. } => "EVENT_SAVE_FAILED",
            Self::EventRetrievalFailed { .. } => "EVENT_RETRIEVAL_FAILED",
            Self::SerializationError { .. } => "SERIALIZATION_ERROR",
            Self::BusUnavailable { .. } => "EVENT_BUS_UNAVAILABLE",
            Self::Unroutable { .. } => "MESSAGE_UNROUTABLE",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code a thin web layer would use for this error (spec §6).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError { .. } => 400,
            Self::InvalidTransition { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::AlreadyDeleted { .. } => 410,
            Self::ConcurrencyConflict { .. } | Self::DuplicateEvent { .. } => 409,
            Self::InvalidEventStream { .. }
            | Self::EventSaveFailed { .. }
            | Self::EventRetrievalFailed { .. }
            | Self::SerializationError { .. }
            | Self::Unroutable { .. }
            | Self::Internal { .. } => 500,
            Self::EventStoreUnavailable { .. } | Self::BusUnavailable { .. } => 503,
        }
    }

    /// Whether callers should retry this error automatically. Only
    /// infrastructure-transient errors and concurrency conflicts (bounded,
    /// see `appendBatch`) are retryable; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. }
                | Self::EventStoreUnavailable { .. }
                | Self::BusUnavailable { .. }
        )
    }
}

/// Result alias used throughout the substrate.
pub type Result<T> = std::result::Result<T, LibraryError>;
