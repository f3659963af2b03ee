//! In-memory handler registry (spec §4.4.2's `subscribe`/`subscribeToAll`/
//! `unsubscribe`). `*` is the wildcard key used by `subscribeToAll`;
//! dispatch concatenates specific handlers with wildcard handlers.

use library_core::domain::DomainEvent;
use library_core::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const WILDCARD: &str = "*";

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler = Arc<dyn Fn(DomainEvent) -> HandlerFuture + Send + Sync>;

#[derive(Clone)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    event_type: String,
    handler: Handler,
}

/// Registered handlers keyed by the event type they were subscribed under
/// (`*` included), plus the routing-key bindings each event type needs on
/// the service queue.
#[derive(Default)]
pub struct HandlerRegistry {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event_type` (`*` for `subscribeToAll`).
    /// Returns bindings that need to change: the caller binds the queue the
    /// first time an event type gains a handler.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> (HandlerId, bool) {
        let mut registrations = self.registrations.lock().unwrap();
        let is_first_for_type = !registrations.iter().any(|r| r.event_type == event_type);
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        registrations.push(Registration {
            id: id.clone(),
            event_type: event_type.to_string(),
            handler,
        });
        (id, is_first_for_type)
    }

    /// Removes the handler. Returns `true` if that was the last handler for
    /// its event type, so the caller should unbind the queue (spec §4.4.2).
    pub fn unsubscribe(&self, id: &HandlerId) -> Option<(String, bool)> {
        let mut registrations = self.registrations.lock().unwrap();
        let position = registrations.iter().position(|r| r.id.0 == id.0)?;
        let removed = registrations.remove(position);
        let now_empty = !registrations.iter().any(|r| r.event_type == removed.event_type);
        Some((removed.event_type, now_empty))
    }

    /// Specific handlers for `event_type`, concatenated with `*` handlers
    /// (spec §4.4.3 step 2).
    pub fn handlers_for(&self, event_type: &str) -> Vec<Handler> {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .filter(|r| r.event_type == event_type || r.event_type == WILDCARD)
            .map(|r| r.handler.clone())
            .collect()
    }

    pub fn bound_event_types(&self) -> Vec<String> {
        let registrations = self.registrations.lock().unwrap();
        let mut types: Vec<String> = registrations.iter().map(|r| r.event_type.clone()).collect();
        types.sort();
        types.dedup();
        types
    }
}

/// Translates a subscription's event type into the routing-key pattern used
/// for `queue_bind` (spec §4.4.2: `*` maps to `#`).
pub fn binding_pattern(event_type: &str) -> String {
    if event_type == WILDCARD {
        "#".to_string()
    } else {
        event_type.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_handler() -> Handler {
        Arc::new(|_event| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn first_subscription_for_a_type_reports_bind_needed() {
        let registry = HandlerRegistry::new();
        let (_, is_first) = registry.subscribe("BOOK_CREATED", noop_handler());
        assert!(is_first);
        let (_, is_first_again) = registry.subscribe("BOOK_CREATED", noop_handler());
        assert!(!is_first_again);
    }

    #[test]
    fn unsubscribe_last_handler_reports_unbind_needed() {
        let registry = HandlerRegistry::new();
        let (id, _) = registry.subscribe("BOOK_CREATED", noop_handler());
        let (event_type, now_empty) = registry.unsubscribe(&id).unwrap();
        assert_eq!(event_type, "BOOK_CREATED");
        assert!(now_empty);
    }

    #[test]
    fn wildcard_handlers_are_included_for_every_event_type() {
        let registry = HandlerRegistry::new();
        registry.subscribe(WILDCARD, noop_handler());
        registry.subscribe("BOOK_CREATED", noop_handler());

        let handlers = registry.handlers_for("BOOK_CREATED");
        assert_eq!(handlers.len(), 2);
        let handlers = registry.handlers_for("RESERVATION_CREATED");
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn binding_pattern_maps_wildcard_to_hash() {
        assert_eq!(binding_pattern(WILDCARD), "#");
        assert_eq!(binding_pattern("BOOK_CREATED"), "BOOK_CREATED");
    }

    #[tokio::test]
    async fn handler_can_be_invoked_through_registry() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let handler: Handler = Arc::new(move |event: DomainEvent| {
            let seen = seen_clone.clone();
            Box::pin(async move {
                seen.lock().unwrap().push(event.event_type.clone());
                Ok(())
            })
        });
        registry.subscribe("BOOK_CREATED", handler);

        let event = DomainEvent::new("book-1", "BOOK_CREATED", json!({}));
        for handler in registry.handlers_for(&event.event_type) {
            (handler)(event.clone()).await.unwrap();
        }
        assert_eq!(seen.lock().unwrap().as_slice(), ["BOOK_CREATED"]);
    }
}
