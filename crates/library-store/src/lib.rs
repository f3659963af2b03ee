//! # Library Store
//!
//! Postgres-backed event store and projection repositories for the
//! library-management event-sourcing substrate (spec §4.1, §4.3).
//! Everything here is a `library_core::domain`/`library_core::error`
//! consumer; nothing in this crate knows about HTTP, AMQP, or process
//! wiring.

pub mod connection;
pub mod event_store;
pub mod projections;
pub mod schema;
pub mod testing;

pub use event_store::{EventStore, PgEventStore, StoreError, StoreResult};
pub use projections::{
    BookProjectionRepository, Page, PaginatedResult, Pagination, ProjectionRepository, ProjectionWriter,
    ReservationProjectionRepository, WalletProjectionRepository,
};
