//! In-memory fakes for the store-facing traits, mirroring
//! `library_core::testing`'s shape but kept always-compiled (not
//! `#[cfg(test)]`-gated) so `library-app` and other downstream crates can
//! exercise choreography logic without a running Postgres instance.

mod event_store;
mod projections;

pub use event_store::InMemoryEventStore;
pub use projections::InMemoryProjectionRepository;
