//! # Correlation Propagation
//!
//! A small typed helper so "every cross-aggregate hop carries the
//! originating correlationId" (spec §4.5) is enforced by the type system
//! rather than by convention: a [`CorrelationContext`] can only be built
//! from an existing event's metadata or freshly generated at the start of
//! a choreography, and every event a handler produces is stamped from it.

use crate::domain::event::DomainEvent;
use uuid::Uuid;

/// Threaded through a choreography handler so every event it produces
/// carries the same `correlationId` as the event that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationContext {
    correlation_id: Uuid,
}

impl CorrelationContext {
    /// Start a new choreography (e.g. the initial user command).
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Continue an existing choreography from the event that triggered this
    /// handler.
    pub fn from_event(event: &DomainEvent) -> Self {
        Self {
            correlation_id: event.metadata.correlation_id,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Stamp an event with this context's correlation id before publishing.
    pub fn stamp(&self, event: DomainEvent) -> DomainEvent {
        event.with_correlation_id(self.correlation_id)
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_event_reuses_the_triggering_correlation_id() {
        let trigger = DomainEvent::new("res-1", "RESERVATION_CREATED", json!({}));
        let context = CorrelationContext::from_event(&trigger);
        assert_eq!(context.correlation_id(), trigger.metadata.correlation_id);
    }

    #[test]
    fn stamp_propagates_the_context_id_not_the_events_own() {
        let context = CorrelationContext::new();
        let produced = DomainEvent::new("res-1", "RESERVATION_PENDING_PAYMENT", json!({}));
        let stamped = context.stamp(produced);
        assert_eq!(stamped.metadata.correlation_id, context.correlation_id());
    }
}
