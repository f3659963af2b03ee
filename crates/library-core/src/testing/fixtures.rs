//! Common fixtures for domain/event tests (spec §8's E1-E6 scenarios).

use crate::domain::{event::EventMetadata, BookProps, DomainEvent};
use serde_json::json;
use uuid::Uuid;

pub fn sample_book_props() -> BookProps {
    BookProps {
        title: "Dune".to_string(),
        author: "Frank Herbert".to_string(),
        isbn: "978-0-441-01359-3".to_string(),
        retail_price: 12.99,
    }
}

/// A freshly-produced (not yet persisted) `BOOK_CREATED` event, with a
/// deterministic correlation id so assertions can match on it.
pub fn sample_book_created_event(aggregate_id: impl Into<String>, correlation_id: Uuid) -> DomainEvent {
    let props = sample_book_props();
    DomainEvent::new(
        aggregate_id,
        "BOOK_CREATED",
        json!({
            "title": props.title,
            "author": props.author,
            "isbn": props.isbn,
            "retailPrice": props.retail_price,
        }),
    )
    .with_correlation_id(correlation_id)
}

pub fn sample_metadata() -> EventMetadata {
    EventMetadata::new(Uuid::new_v4())
}
