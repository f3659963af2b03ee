//! # Book Aggregate
//!
//! Representative full-lifecycle aggregate (spec §8 scenario E1: create →
//! update → delete). Deliberately simple state: a book exists, its retail
//! price and metadata can be updated, and it can be soft-deleted. All
//! mutation goes through command methods that validate, then emit exactly
//! one event.

use crate::domain::aggregate::AggregateRoot;
use crate::domain::event::DomainEvent;
use crate::error::LibraryError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookProps {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub retail_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    id: String,
    version: i64,
    deleted: bool,
    uncommitted: Vec<DomainEvent>,

    pub title: String,
    pub author: String,
    pub isbn: String,
    pub retail_price: f64,
}

impl Book {
    /// Factory: validates `props`, assigns a new id, emits `BOOK_CREATED`
    /// at version 1 (spec §4.2).
    pub fn create(props: BookProps) -> Result<Self, LibraryError> {
        if props.title.trim().is_empty() {
            return Err(LibraryError::validation("book title must not be empty"));
        }
        if props.isbn.trim().is_empty() {
            return Err(LibraryError::validation("book isbn must not be empty"));
        }
        if props.retail_price < 0.0 {
            return Err(LibraryError::validation("book retail_price must not be negative"));
        }

        let id = Uuid::new_v4().to_string();
        let event = DomainEvent::new(
            id.clone(),
            Self::CREATED_EVENT_TYPE,
            json!({
                "title": props.title,
                "author": props.author,
                "isbn": props.isbn,
                "retailPrice": props.retail_price,
            }),
        );

        let mut book = Self {
            id,
            version: 0,
            deleted: false,
            uncommitted: Vec::new(),
            title: props.title,
            author: props.author,
            isbn: props.isbn,
            retail_price: props.retail_price,
        };
        book.record_event(event);
        Ok(book)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Update mutable fields. Rejected once the book is deleted.
    pub fn update(&mut self, title: Option<String>, retail_price: Option<f64>) -> Result<(), LibraryError> {
        if self.deleted {
            return Err(LibraryError::AlreadyDeleted {
                aggregate: Self::KIND.to_string(),
                id: self.id.clone(),
            });
        }
        if let Some(price) = retail_price {
            if price < 0.0 {
                return Err(LibraryError::validation("book retail_price must not be negative"));
            }
        }

        let mut payload = serde_json::Map::new();
        if let Some(title) = &title {
            payload.insert("title".to_string(), json!(title));
        }
        if let Some(price) = retail_price {
            payload.insert("retailPrice".to_string(), json!(price));
        }

        let event = DomainEvent::new(self.id.clone(), "BOOK_UPDATED", serde_json::Value::Object(payload));
        self.record_event(event);
        Ok(())
    }

    /// Soft-delete. Idempotent-by-rejection: a second delete fails
    /// `ALREADY_DELETED` rather than emitting a duplicate event.
    pub fn delete(&mut self) -> Result<(), LibraryError> {
        if self.deleted {
            return Err(LibraryError::AlreadyDeleted {
                aggregate: Self::KIND.to_string(),
                id: self.id.clone(),
            });
        }
        let event = DomainEvent::new(self.id.clone(), "BOOK_DELETED", json!({}));
        self.record_event(event);
        Ok(())
    }
}

impl AggregateRoot for Book {
    const KIND: &'static str = "Book";
    const CREATED_EVENT_TYPE: &'static str = "BOOK_CREATED";

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
        let title = event.payload["title"].as_str().unwrap_or_default().to_string();
        let author = event.payload["author"].as_str().unwrap_or_default().to_string();
        let isbn = event.payload["isbn"].as_str().unwrap_or_default().to_string();
        let retail_price = event.payload["retailPrice"].as_f64().unwrap_or(0.0);

        Ok(Self {
            id: event.aggregate_id.clone(),
            version: 0,
            deleted: false,
            uncommitted: Vec::new(),
            title,
            author,
            isbn,
            retail_price,
        })
    }

    fn apply_event(&mut self, event: &DomainEvent) {
        match event.event_type.as_str() {
            "BOOK_UPDATED" => {
                if let Some(title) = event.payload.get("title").and_then(|v| v.as_str()) {
                    self.title = title.to_string();
                }
                if let Some(price) = event.payload.get("retailPrice").and_then(|v| v.as_f64()) {
                    self.retail_price = price;
                }
            }
            "BOOK_DELETED" => {
                self.deleted = true;
            }
            other => {
                tracing::debug!(event_type = other, "book: ignoring unknown event type");
            }
        }
    }

    fn push_uncommitted(&mut self, event: DomainEvent) {
        self.uncommitted.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::rehydrate;

    fn props() -> BookProps {
        BookProps {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: "978-0-441-01359-3".to_string(),
            retail_price: 12.99,
        }
    }

    #[test]
    fn create_rejects_empty_title() {
        let mut bad = props();
        bad.title = "  ".to_string();
        assert!(matches!(Book::create(bad), Err(LibraryError::ValidationError { .. })));
    }

    #[test]
    fn full_lifecycle_create_update_delete() {
        let mut book = Book::create(props()).unwrap();
        assert_eq!(book.version(), 1);
        assert_eq!(book.uncommitted_events().len(), 1);

        book.update(Some("Dune Messiah".to_string()), Some(14.99)).unwrap();
        assert_eq!(book.title, "Dune Messiah");
        assert_eq!(book.retail_price, 14.99);
        assert_eq!(book.version(), 2);

        book.delete().unwrap();
        assert!(book.is_deleted());
        assert_eq!(book.version(), 3);

        assert!(matches!(book.delete(), Err(LibraryError::AlreadyDeleted { .. })));
    }

    #[test]
    fn rehydrate_reconstructs_identical_state() {
        let mut book = Book::create(props()).unwrap();
        book.update(Some("Dune Messiah".to_string()), None).unwrap();
        let events = book.take_uncommitted_events();

        let rebuilt: Book = rehydrate(events).unwrap();
        assert_eq!(rebuilt.title, "Dune Messiah");
        assert_eq!(rebuilt.retail_price, 12.99);
        assert_eq!(rebuilt.version(), 2);
    }
}
