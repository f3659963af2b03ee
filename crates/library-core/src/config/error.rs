//! Configuration error types
//!
//! This module provides the error types for configuration management.

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable not found: {key}")]
    EnvVarNotFound { key: String, hint: Option<String> },

    #[error("invalid configuration value for {key}: {value} (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
        context: String,
    },

    #[error("validation failed: {message}")]
    ValidationFailed {
        message: String,
        category: String,
        suggestion: String,
        details: Vec<(String, String)>,
    },

    #[error("parsing error in {context} ({key}): {message}")]
    ParseError {
        message: String,
        context: String,
        key: String,
    },

    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),
}

impl ConfigError {
    pub fn env_var_not_found(key: impl Into<String>, hint: Option<&str>) -> Self {
        Self::EnvVarNotFound {
            key: key.into(),
            hint: hint.map(|s| s.to_string()),
        }
    }

    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            expected: expected.into(),
            context: context.into(),
        }
    }

    pub fn validation_failed(
        message: impl Into<String>,
        category: impl Into<String>,
        suggestion: impl Into<String>,
        details: Vec<(String, String)>,
    ) -> Self {
        Self::ValidationFailed {
            message: message.into(),
            category: category.into(),
            suggestion: suggestion.into(),
            details,
        }
    }

    pub fn parse_error(
        message: impl Into<String>,
        context: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::ParseError {
            message: message.into(),
            context: context.into(),
            key: key.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
