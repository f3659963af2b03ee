//! # Aggregate Root & Rehydration
//!
//! Shared machinery for folding an ordered event stream into an in-memory
//! aggregate (spec §4.2). Each aggregate kind (`Book`, `Reservation`,
//! `Wallet`) implements [`AggregateRoot`]; `rehydrate` and the uncommitted
//! event buffer are generic over that trait.

use crate::domain::event::DomainEvent;
use crate::error::LibraryError;

/// An aggregate that can be rebuilt by folding a `*_CREATED` event followed
/// by zero or more subsequent events, and that buffers newly-produced
/// events until they are committed to the store.
pub trait AggregateRoot: Sized {
    /// `"Book"`, `"Reservation"`, `"Wallet"` — used in error messages and
    /// log fields.
    const KIND: &'static str;

    /// The `eventType` a freshly-created aggregate's first event must carry.
    const CREATED_EVENT_TYPE: &'static str;

    /// Aggregate id (UUID string).
    fn id(&self) -> &str;

    /// Version of the last applied event (0 before any event).
    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Events produced by command methods but not yet persisted.
    fn uncommitted_events(&self) -> &[DomainEvent];

    fn take_uncommitted_events(&mut self) -> Vec<DomainEvent>;

    /// Construct the initial aggregate state from a `*_CREATED` event's
    /// payload. Called once by `rehydrate`.
    fn from_created_event(event: &DomainEvent) -> Result<Self, LibraryError>;

    /// Fold a single event into mutable state. Must be pure and total:
    /// unknown `eventType` values are logged and ignored rather than erroring
    /// (forward compatibility, spec §4.2).
    fn apply_event(&mut self, event: &DomainEvent);

    /// Buffer a freshly-produced event as uncommitted and fold it into state
    /// immediately so subsequent command methods observe the new state.
    fn record_event(&mut self, event: DomainEvent) {
        self.apply_event(&event);
        self.set_version(self.version() + 1);
        self.push_uncommitted(event);
    }

    fn push_uncommitted(&mut self, event: DomainEvent);
}

/// Deterministically rebuild an aggregate by folding events ordered by
/// `version` (spec §4.2). The first event must be `*_CREATED`; versions
/// must be contiguous starting at 1, else `INVALID_EVENT_STREAM`.
pub fn rehydrate<A: AggregateRoot>(mut events: Vec<DomainEvent>) -> Result<A, LibraryError> {
    if events.is_empty() {
        return Err(LibraryError::InvalidEventStream {
            message: format!("{} stream has no events", A::KIND),
        });
    }

    events.sort_by_key(|e| e.version);

    let first = &events[0];
    if first.version != 1 {
        return Err(LibraryError::InvalidEventStream {
            message: format!(
                "{} stream must start at version 1, found {}",
                A::KIND,
                first.version
            ),
        });
    }
    if first.event_type != A::CREATED_EVENT_TYPE {
        return Err(LibraryError::InvalidEventStream {
            message: format!(
                "{} stream must start with {}, found {}",
                A::KIND,
                A::CREATED_EVENT_TYPE,
                first.event_type
            ),
        });
    }

    let mut aggregate = A::from_created_event(first)?;
    aggregate.set_version(1);

    let mut expected = 2i64;
    for event in &events[1..] {
        if event.version != expected {
            return Err(LibraryError::InvalidEventStream {
                message: format!(
                    "{} stream has a gap: expected version {}, found {}",
                    A::KIND,
                    expected,
                    event.version
                ),
            });
        }
        aggregate.apply_event(event);
        aggregate.set_version(event.version);
        expected += 1;
    }

    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        id: String,
        version: i64,
        value: i64,
        uncommitted: Vec<DomainEvent>,
    }

    impl AggregateRoot for Counter {
        const KIND: &'static str = "Counter";
        const CREATED_EVENT_TYPE: &'static str = "COUNTER_CREATED";

        fn id(&self) -> &str {
            &self.id
        }

        fn version(&self) -> i64 {
            self.version
        }

        fn set_version(&mut self, version: i64) {
            self.version = version;
        }

        fn uncommitted_events(&self) -> &[DomainEvent] {
            &self.uncommitted
        }

        fn take_uncommitted_events(&mut self) -> Vec<DomainEvent> {
            std::mem::take(&mut self.uncommitted)
        }

        fn from_created_event(event: &DomainEvent) -> Result<Self, LibraryError> {
            Ok(Self {
                id: event.aggregate_id.clone(),
                version: 0,
                value: 0,
                uncommitted: Vec::new(),
            })
        }

        fn apply_event(&mut self, event: &DomainEvent) {
            match event.event_type.as_str() {
                "COUNTER_INCREMENTED" => self.value += 1,
                _ => {}
            }
        }

        fn push_uncommitted(&mut self, event: DomainEvent) {
            self.uncommitted.push(event);
        }
    }

    fn event(aggregate_id: &str, event_type: &str, version: i64) -> DomainEvent {
        let mut e = DomainEvent::new(aggregate_id, event_type, json!({}));
        e.version = version;
        e.global_version = version;
        e
    }

    #[test]
    fn rehydrate_folds_events_in_version_order() {
        let events = vec![
            event("c-1", "COUNTER_INCREMENTED", 2),
            event("c-1", "COUNTER_CREATED", 1),
            event("c-1", "COUNTER_INCREMENTED", 3),
        ];
        let counter: Counter = rehydrate(events).unwrap();
        assert_eq!(counter.version, 3);
        assert_eq!(counter.value, 2);
    }

    #[test]
    fn rehydrate_rejects_non_created_first_event() {
        let events = vec![event("c-1", "COUNTER_INCREMENTED", 1)];
        let result: Result<Counter, _> = rehydrate(events);
        assert!(matches!(result, Err(LibraryError::InvalidEventStream { .. })));
    }

    #[test]
    fn rehydrate_rejects_version_gaps() {
        let events = vec![
            event("c-1", "COUNTER_CREATED", 1),
            event("c-1", "COUNTER_INCREMENTED", 3),
        ];
        let result: Result<Counter, _> = rehydrate(events);
        assert!(matches!(result, Err(LibraryError::InvalidEventStream { .. })));
    }

    #[test]
    fn record_event_folds_immediately_and_buffers() {
        let mut counter = Counter {
            id: "c-1".to_string(),
            version: 1,
            value: 0,
            uncommitted: Vec::new(),
        };
        counter.record_event(event("c-1", "COUNTER_INCREMENTED", 2));
        assert_eq!(counter.value, 1);
        assert_eq!(counter.version, 2);
        assert_eq!(counter.take_uncommitted_events().len(), 1);
    }
}
