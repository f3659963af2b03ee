//! # Event Store (spec §4.1)
//!
//! Durable, append-only log keyed by aggregate id, with per-aggregate
//! optimistic concurrency and a monotonic global sequence. `PgEventStore`
//! is the only implementation that touches a database; `append_batch`
//! wraps `save_events` with the bounded retry ladder spec §4.1 requires.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::PgEventStore;

use async_trait::async_trait;
use library_core::domain::DomainEvent;
use library_core::error::{LibraryError, Result};

/// The durable append-only log described in spec §4.1.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `events` for `aggregate_id`, failing `CONCURRENCY_CONFLICT`
    /// if the stored max version isn't exactly `expected_version`.
    /// Precondition: `aggregate_id` non-empty; empty `events` is a no-op.
    async fn save_events(
        &self,
        aggregate_id: &str,
        events: Vec<DomainEvent>,
        expected_version: i64,
    ) -> Result<Vec<DomainEvent>>;

    /// `save_events` wrapped in bounded retry (default 3 attempts) for
    /// `CONCURRENCY_CONFLICT` only (spec §4.1). Re-reads the current version
    /// between attempts so a retried call targets the right `expected_version`.
    async fn append_batch(
        &self,
        aggregate_id: &str,
        events: Vec<DomainEvent>,
    ) -> Result<Vec<DomainEvent>>;

    /// Events for `aggregate_id` ordered by `version` ascending. Empty if none.
    async fn get_events_for_aggregate(&self, aggregate_id: &str) -> Result<Vec<DomainEvent>>;

    /// Highest version currently stored for `aggregate_id` (0 if none).
    async fn current_version(&self, aggregate_id: &str) -> Result<i64>;

    /// Atomically reserve `n` global version numbers, returning the
    /// highest reserved (the block is `[highest-n+1, highest]`).
    async fn next_global_version(&self, n: i64) -> Result<i64>;
}

/// `None` / zero-length appends are always a successful no-op, regardless
/// of backing store -- a shared guard so every implementation agrees.
pub(crate) fn reject_empty_aggregate_id(aggregate_id: &str) -> Result<()> {
    if aggregate_id.trim().is_empty() {
        return Err(LibraryError::validation("aggregateId must not be empty"));
    }
    Ok(())
}
