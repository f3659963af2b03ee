//! # Event Upcasting
//!
//! Before an aggregate folds an event, a pluggable, **pure, I/O-free**
//! upcaster may rewrite its payload to the latest `schemaVersion` (spec
//! §4.4.6). The default is identity for every event type; services register
//! concrete migrations for event types whose payload shape changed.

use crate::domain::event::DomainEvent;
use std::collections::HashMap;
use std::sync::Arc;

/// One payload migration step: rewrites a single event from `from_version`
/// to `from_version + 1`. Must not perform I/O.
pub trait Upcaster: Send + Sync {
    fn event_type(&self) -> &'static str;
    fn from_version(&self) -> i32;
    fn upcast(&self, payload: serde_json::Value) -> serde_json::Value;
}

/// Registry of upcasters, keyed by `(eventType, fromVersion)`. Applying an
/// event repeatedly walks the chain until no further migration is
/// registered for its current `schemaVersion`.
#[derive(Default, Clone)]
pub struct UpcasterRegistry {
    upcasters: HashMap<(&'static str, i32), Arc<dyn Upcaster>>,
}

impl UpcasterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, upcaster: Arc<dyn Upcaster>) {
        self.upcasters
            .insert((upcaster.event_type(), upcaster.from_version()), upcaster);
    }

    /// Rewrite `event` in place to the newest schema version reachable
    /// through the registered chain. Identity (a no-op) when nothing is
    /// registered for its current version.
    pub fn upcast(&self, mut event: DomainEvent) -> DomainEvent {
        loop {
            let found = self
                .upcasters
                .iter()
                .find(|((event_type, from_version), _)| {
                    *event_type == event.event_type.as_str() && *from_version == event.schema_version
                })
                .map(|(_, upcaster)| upcaster.clone());

            let Some(upcaster) = found else {
                break;
            };
            event.payload = upcaster.upcast(event.payload);
            event.schema_version += 1;
        }
        event
    }
}

/// Worked example: `BOOK_CREATED` v1 renamed `retail_price` to `price`.
pub struct BookCreatedV1ToV2;

impl Upcaster for BookCreatedV1ToV2 {
    fn event_type(&self) -> &'static str {
        "BOOK_CREATED"
    }

    fn from_version(&self) -> i32 {
        1
    }

    fn upcast(&self, mut payload: serde_json::Value) -> serde_json::Value {
        if let Some(object) = payload.as_object_mut() {
            if let Some(old_price) = object.remove("retail_price") {
                object.insert("price".to_string(), old_price);
            }
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_by_default() {
        let registry = UpcasterRegistry::new();
        let event = DomainEvent::new("book-1", "BOOK_CREATED", json!({"title": "Dune"}));
        let upcasted = registry.upcast(event.clone());
        assert_eq!(upcasted, event);
    }

    #[test]
    fn registered_migration_renames_field_and_bumps_schema_version() {
        let mut registry = UpcasterRegistry::new();
        registry.register(Arc::new(BookCreatedV1ToV2));

        let mut event = DomainEvent::new("book-1", "BOOK_CREATED", json!({"title": "Dune", "retail_price": 12.5}));
        event.schema_version = 1;

        let upcasted = registry.upcast(event);
        assert_eq!(upcasted.schema_version, 2);
        assert_eq!(upcasted.payload["price"], json!(12.5));
        assert!(upcasted.payload.get("retail_price").is_none());
    }
}
