//! In-memory `EventStore`, for choreography and projection-handler tests
//! that shouldn't need a running Postgres instance.

use async_trait::async_trait;
use library_core::domain::DomainEvent;
use library_core::error::{LibraryError, Result};
use std::sync::Mutex;

use crate::event_store::{reject_empty_aggregate_id, EventStore};

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save_events(
        &self,
        aggregate_id: &str,
        events: Vec<DomainEvent>,
        expected_version: i64,
    ) -> Result<Vec<DomainEvent>> {
        reject_empty_aggregate_id(aggregate_id)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut store = self.events.lock().unwrap();
        let current_max = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(0);

        if current_max != expected_version {
            return Err(LibraryError::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual: current_max,
            });
        }

        let global_start = store.iter().map(|e| e.global_version).max().unwrap_or(0) + 1;
        let now = chrono::Utc::now();

        let mut persisted = Vec::with_capacity(events.len());
        for (i, mut event) in events.into_iter().enumerate() {
            event.aggregate_id = aggregate_id.to_string();
            event.version = expected_version + i as i64 + 1;
            event.global_version = global_start + i as i64;
            event.metadata.stored = Some(now);
            persisted.push(event);
        }

        store.extend(persisted.clone());
        Ok(persisted)
    }

    async fn append_batch(&self, aggregate_id: &str, events: Vec<DomainEvent>) -> Result<Vec<DomainEvent>> {
        reject_empty_aggregate_id(aggregate_id)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let expected_version = self.current_version(aggregate_id).await?;
        self.save_events(aggregate_id, events, expected_version).await
    }

    async fn get_events_for_aggregate(&self, aggregate_id: &str) -> Result<Vec<DomainEvent>> {
        reject_empty_aggregate_id(aggregate_id)?;
        let store = self.events.lock().unwrap();
        let mut events: Vec<DomainEvent> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn current_version(&self, aggregate_id: &str) -> Result<i64> {
        reject_empty_aggregate_id(aggregate_id)?;
        let store = self.events.lock().unwrap();
        Ok(store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(0))
    }

    async fn next_global_version(&self, n: i64) -> Result<i64> {
        let store = self.events.lock().unwrap();
        let highest = store.iter().map(|e| e.global_version).max().unwrap_or(0) + n;
        Ok(highest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(aggregate_id: &str, event_type: &str) -> DomainEvent {
        DomainEvent::new(aggregate_id, event_type, json!({}))
    }

    #[tokio::test]
    async fn save_events_assigns_contiguous_versions() {
        let store = InMemoryEventStore::new();
        let persisted = store
            .save_events("book-1", vec![event("book-1", "BOOK_CREATED")], 0)
            .await
            .unwrap();
        assert_eq!(persisted[0].version, 1);
        assert_eq!(persisted[0].global_version, 1);

        let persisted = store
            .save_events("book-1", vec![event("book-1", "BOOK_UPDATED")], 1)
            .await
            .unwrap();
        assert_eq!(persisted[0].version, 2);
    }

    #[tokio::test]
    async fn save_events_rejects_stale_expected_version() {
        let store = InMemoryEventStore::new();
        store
            .save_events("book-1", vec![event("book-1", "BOOK_CREATED")], 0)
            .await
            .unwrap();

        let result = store.save_events("book-1", vec![event("book-1", "BOOK_UPDATED")], 0).await;
        assert!(matches!(result, Err(LibraryError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn append_batch_reads_current_version_automatically() {
        let store = InMemoryEventStore::new();
        store.append_batch("book-1", vec![event("book-1", "BOOK_CREATED")]).await.unwrap();
        let persisted = store.append_batch("book-1", vec![event("book-1", "BOOK_UPDATED")]).await.unwrap();
        assert_eq!(persisted[0].version, 2);
    }

    #[tokio::test]
    async fn get_events_for_aggregate_orders_by_version() {
        let store = InMemoryEventStore::new();
        store.append_batch("book-1", vec![event("book-1", "BOOK_CREATED")]).await.unwrap();
        store.append_batch("book-1", vec![event("book-1", "BOOK_UPDATED")]).await.unwrap();

        let events = store.get_events_for_aggregate("book-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].version, 1);
        assert_eq!(events[1].version, 2);
    }
}
