//! # Library Core
//!
//! Core primitives for the library-management event-sourcing/CQRS
//! substrate: domain aggregates, the error taxonomy shared by every other
//! crate, and environment-driven configuration.
//!
//! ## Core Concepts
//!
//! - **Events**: [`domain::DomainEvent`] is the wire envelope every
//!   aggregate emits and every projection/bus consumer reads.
//! - **Aggregates**: types implementing [`domain::AggregateRoot`]
//!   (`Book`, `Reservation`, `Wallet`) are rebuilt by folding their event
//!   stream with [`domain::rehydrate`].
//! - **Errors**: every fallible operation across the workspace returns
//!   [`error::LibraryError`].
//! - **Config**: [`config::LibraryConfig`] loads and validates the
//!   environment once at process startup.
//!
//! ## Examples
//!
//! ```rust
//! use library_core::domain::{Book, BookProps, AggregateRoot};
//!
//! let book = Book::create(BookProps {
//!     title: "Dune".to_string(),
//!     author: "Frank Herbert".to_string(),
//!     isbn: "978-0-441-01359-3".to_string(),
//!     retail_price: 12.99,
//! }).unwrap();
//! assert_eq!(book.version(), 1);
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod testing;

pub use domain::{rehydrate, AggregateRoot, Book, CorrelationContext, DomainEvent, Reservation, Wallet};
pub use error::{ErrorCategory, ErrorSeverity, LibraryError, Result};

/// Current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::domain::{rehydrate, AggregateRoot, Book, CorrelationContext, DomainEvent, Reservation, Wallet};
    pub use crate::error::{LibraryError, Result};
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}
