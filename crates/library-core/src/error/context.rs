//! # Error Context Utilities
//!
//! This module provides utilities for adding rich context to errors,
//! including correlation IDs, structured metadata, and error chaining.

use super::{ErrorCategory, ErrorMetadata, ErrorSeverity, LibraryError};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Error with additional context
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: LibraryError,
    /// Error metadata
    pub metadata: ErrorMetadata,
    /// Error chain (causes)
    pub chain: Vec<String>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(error: LibraryError) -> Self {
        let (category, severity, code) = categorize_error(&error);
        Self {
            error,
            metadata: ErrorMetadata::new(category, severity, code),
            chain: Vec::new(),
        }
    }

    /// Add context value
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.metadata.context.insert(key.into(), json_value);
        }
        self
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(id.into());
        self
    }

    /// Add to error chain
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.chain.push(cause.into());
        self
    }

    /// Convert to JSON for logging
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.error.to_string(),
            "error_code": self.error.error_code(),
            "category": self.metadata.category,
            "severity": self.metadata.severity,
            "correlation_id": self.metadata.correlation_id,
            "context": self.metadata.context,
            "chain": self.chain,
            "timestamp": self.metadata.timestamp,
            "retry_count": self.metadata.retry_count,
        })
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContextExt: Sized {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext;
    fn with_correlation_id(self, id: impl Into<String>) -> ErrorContext;
    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext;
}

impl ErrorContextExt for LibraryError {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext {
        ErrorContext::new(self).with_context(key, value)
    }

    fn with_correlation_id(self, id: impl Into<String>) -> ErrorContext {
        ErrorContext::new(self).with_correlation_id(id)
    }

    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext {
        let mut error_context = ErrorContext::new(self);
        for (key, value) in contexts {
            error_context.metadata.context.insert(key, value);
        }
        error_context
    }
}

/// Categorize an error for metrics/logging purposes. Mirrors
/// [`LibraryError::is_retryable`] but also assigns a severity and a stable
/// metrics code, independent of the Display-formatted error code.
pub fn categorize_error(error: &LibraryError) -> (ErrorCategory, ErrorSeverity, String) {
    use LibraryError::*;
    match error {
        EventStoreUnavailable { .. } | BusUnavailable { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Error, "INFRA_001".to_string())
        }
        ConcurrencyConflict { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Warning, "CONC_001".to_string())
        }
        DuplicateEvent { .. } => {
            (ErrorCategory::Permanent, ErrorSeverity::Warning, "DUP_001".to_string())
        }
        ValidationError { .. } => {
            (ErrorCategory::User, ErrorSeverity::Warning, "VAL_001".to_string())
        }
        InvalidTransition { .. } => {
            (ErrorCategory::Business, ErrorSeverity::Warning, "FSM_001".to_string())
        }
        NotFound { .. } => (ErrorCategory::User, ErrorSeverity::Info, "404_001".to_string()),
        AlreadyDeleted { .. } => {
            (ErrorCategory::User, ErrorSeverity::Info, "GONE_001".to_string())
        }
        InvalidEventStream { .. } => {
            (ErrorCategory::Permanent, ErrorSeverity::Critical, "STREAM_001".to_string())
        }
        EventSaveFailed { .. } | EventRetrievalFailed { .. } => {
            (ErrorCategory::System, ErrorSeverity::Error, "STORE_001".to_string())
        }
        SerializationError { .. } => {
            (ErrorCategory::System, ErrorSeverity::Error, "SER_001".to_string())
        }
        Unroutable { .. } => {
            (ErrorCategory::System, ErrorSeverity::Warning, "ROUTE_001".to_string())
        }
        Internal { .. } => {
            (ErrorCategory::System, ErrorSeverity::Error, "INTERNAL_001".to_string())
        }
    }
}

/// Error context builder for fluent API
pub struct ErrorContextBuilder {
    error: LibraryError,
    context: HashMap<String, Value>,
    correlation_id: Option<String>,
    causes: Vec<String>,
}

impl ErrorContextBuilder {
    pub fn new(error: LibraryError) -> Self {
        Self {
            error,
            context: HashMap::new(),
            correlation_id: None,
            causes: Vec::new(),
        }
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.context.insert(key.into(), json_value);
        }
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn build(self) -> ErrorContext {
        let mut error_context = ErrorContext::new(self.error);
        error_context.metadata.context = self.context;
        error_context.metadata.correlation_id = self.correlation_id;
        error_context.chain = self.causes;
        error_context
    }
}

/// Correlation ID generator, used wherever `metadata.correlationId` must be
/// defaulted if absent (spec §3).
pub struct CorrelationIdGenerator;

impl CorrelationIdGenerator {
    pub fn generate() -> uuid::Uuid {
        uuid::Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_context_builder_collects_fields() {
        let error = LibraryError::EventSaveFailed {
            message: "disk full".to_string(),
        };

        let context = ErrorContextBuilder::new(error)
            .context("aggregate_id", "12345")
            .context("operation", "save_events")
            .correlation_id("req-123")
            .cause("disk quota exceeded")
            .build();

        assert_eq!(context.metadata.correlation_id.as_deref(), Some("req-123"));
        assert_eq!(context.chain.len(), 1);
        assert_eq!(
            context.metadata.context.get("aggregate_id"),
            Some(&json!("12345"))
        );
    }

    #[test]
    fn categorizes_transient_vs_permanent() {
        let transient = LibraryError::EventStoreUnavailable {
            message: "timeout".to_string(),
        };
        let (category, _, _) = categorize_error(&transient);
        assert_eq!(category, ErrorCategory::Transient);

        let permanent = LibraryError::InvalidEventStream {
            message: "missing created event".to_string(),
        };
        let (category, severity, _) = categorize_error(&permanent);
        assert_eq!(category, ErrorCategory::Permanent);
        assert_eq!(severity, ErrorSeverity::Critical);
    }
}
