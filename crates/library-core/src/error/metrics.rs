//! Prometheus counters for the error-handling framework (spec's ambient
//! observability stack — carried regardless of the spec's Non-goals, which
//! exclude only the HTTP-visible metrics endpoint, not internal counters).

use super::{ErrorCategory, ErrorSeverity, LibraryError};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Registry};

lazy_static! {
    static ref ERROR_METRICS: ErrorMetrics = ErrorMetrics::new();
}

/// Error counters registered once per process and shared across crates.
pub struct ErrorMetrics {
    pub errors_by_category: CounterVec,
    pub errors_by_code: CounterVec,
    pub retry_attempts: Counter,
    pub retry_successes: Counter,
    pub circuit_breaker_transitions: CounterVec,
}

impl ErrorMetrics {
    fn new() -> Self {
        let errors_by_category = CounterVec::new(
            prometheus::Opts::new(
                "library_errors_by_category_total",
                "Total number of errors by category",
            ),
            &["category"],
        )
        .expect("failed to create errors_by_category metric");

        let errors_by_code = CounterVec::new(
            prometheus::Opts::new(
                "library_errors_by_code_total",
                "Total number of errors by error code",
            ),
            &["error_code"],
        )
        .expect("failed to create errors_by_code metric");

        let retry_attempts = Counter::new(
            "library_retry_attempts_total",
            "Total number of retry attempts across the store and bus",
        )
        .expect("failed to create retry_attempts metric");

        let retry_successes = Counter::new(
            "library_retry_successes_total",
            "Total number of retries that eventually succeeded",
        )
        .expect("failed to create retry_successes metric");

        let circuit_breaker_transitions = CounterVec::new(
            prometheus::Opts::new(
                "library_circuit_breaker_transitions_total",
                "Circuit breaker state transitions",
            ),
            &["from_state", "to_state", "service"],
        )
        .expect("failed to create circuit_breaker_transitions metric");

        Self {
            errors_by_category,
            errors_by_code,
            retry_attempts,
            retry_successes,
            circuit_breaker_transitions,
        }
    }

    /// Register every counter with the given registry. Call once at startup.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.errors_by_category.clone()))?;
        registry.register(Box::new(self.errors_by_code.clone()))?;
        registry.register(Box::new(self.retry_attempts.clone()))?;
        registry.register(Box::new(self.retry_successes.clone()))?;
        registry.register(Box::new(self.circuit_breaker_transitions.clone()))?;
        Ok(())
    }
}

/// Global error metrics, lazily constructed on first use.
pub fn metrics() -> &'static ErrorMetrics {
    &ERROR_METRICS
}

/// Record an error occurrence for the given category/severity pair.
pub fn record_error(error: &LibraryError, category: ErrorCategory, _severity: ErrorSeverity) {
    metrics()
        .errors_by_category
        .with_label_values(&[&format!("{:?}", category)])
        .inc();
    metrics()
        .errors_by_code
        .with_label_values(&[error.error_code()])
        .inc();
}

pub fn record_retry_attempt() {
    metrics().retry_attempts.inc();
}

pub fn record_retry_success() {
    metrics().retry_successes.inc();
}

pub fn record_circuit_breaker_transition(from_state: &str, to_state: &str, service: &str) {
    metrics()
        .circuit_breaker_transitions
        .with_label_values(&[from_state, to_state, service])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_panicking() {
        let error = LibraryError::validation("bad input");
        record_error(&error, ErrorCategory::User, ErrorSeverity::Warning);
        record_retry_attempt();
        record_retry_success();
        record_circuit_breaker_transition("closed", "open", "event-store");
    }
}
