use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use library_core::domain::{DomainEvent, EventMetadata};
use library_core::error::{retry::retry_with_policy, RetryPolicy, Result};

use super::error::{StoreError, StoreResult};
use super::{reject_empty_aggregate_id, EventStore};
use crate::connection::DbPool;
use crate::schema::{event_store, global_version_counter};

#[derive(Queryable, Selectable)]
#[diesel(table_name = event_store)]
struct EventRow {
    id: i64,
    aggregate_id: String,
    event_type: String,
    version: i64,
    global_version: i64,
    schema_version: i32,
    timestamp: chrono::DateTime<Utc>,
    payload: serde_json::Value,
    metadata: serde_json::Value,
}

#[derive(Insertable)]
#[diesel(table_name = event_store)]
struct NewEventRow {
    aggregate_id: String,
    event_type: String,
    version: i64,
    global_version: i64,
    schema_version: i32,
    timestamp: chrono::DateTime<Utc>,
    payload: serde_json::Value,
    metadata: serde_json::Value,
}

impl TryFrom<EventRow> for DomainEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> StoreResult<DomainEvent> {
        let metadata: EventMetadata = serde_json::from_value(row.metadata)?;
        Ok(DomainEvent {
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            version: row.version,
            global_version: row.global_version,
            schema_version: row.schema_version,
            timestamp: row.timestamp,
            payload: row.payload,
            metadata,
        })
    }
}

fn to_new_row(event: &DomainEvent) -> StoreResult<NewEventRow> {
    Ok(NewEventRow {
        aggregate_id: event.aggregate_id.clone(),
        event_type: event.event_type.clone(),
        version: event.version,
        global_version: event.global_version,
        schema_version: event.schema_version,
        timestamp: event.timestamp,
        payload: event.payload.clone(),
        metadata: serde_json::to_value(&event.metadata)?,
    })
}

/// Atomically reserve `n` global version numbers inside an already-open
/// transaction, returning the highest reserved (spec §4.1).
fn reserve_global_version(conn: &mut PgConnection, n: i64) -> QueryResult<i64> {
    // Upsert: first request starts the counter at `n`; subsequent requests
    // atomically add `n` to the existing row under the transaction's lock
    // `save_events` already holds.
    diesel::insert_into(global_version_counter::table)
        .values((
            global_version_counter::id.eq("global"),
            global_version_counter::seq.eq(n),
        ))
        .on_conflict(global_version_counter::id)
        .do_update()
        .set(global_version_counter::seq.eq(global_version_counter::seq + n))
        .returning(global_version_counter::seq)
        .get_result(conn)
}

/// Postgres-backed event store (spec §4.1). The teacher's persistence
/// stack (diesel + r2d2) is kept; see `StoreConfig` for why this substrate
/// doesn't use Mongo despite spec §6 naming Mongo env vars.
pub struct PgEventStore {
    pool: DbPool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
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

        let pool = self.pool.clone();
        let aggregate_id = aggregate_id.to_string();
        let n = events.len() as i64;

        let persisted = tokio::task::spawn_blocking(move || -> StoreResult<Vec<DomainEvent>> {
            let mut conn = pool.get()?;
            conn.transaction::<_, StoreError, _>(|conn| {
                use event_store::dsl;

                let current_max: Option<i64> = dsl::event_store
                    .filter(dsl::aggregate_id.eq(&aggregate_id))
                    .select(diesel::dsl::max(dsl::version))
                    .first(conn)?;
                let current_max = current_max.unwrap_or(0);

                if current_max != expected_version {
                    return Err(StoreError::Concurrency {
                        aggregate_id: aggregate_id.clone(),
                        expected: expected_version,
                        actual: current_max,
                    });
                }

                let global_end = reserve_global_version(conn, n)?;
                let global_start = global_end - n + 1;
                let now = Utc::now();

                let mut rows = Vec::with_capacity(events.len());
                let mut finished = Vec::with_capacity(events.len());
                for (i, mut event) in events.into_iter().enumerate() {
                    event.aggregate_id = aggregate_id.clone();
                    event.version = expected_version + i as i64 + 1;
                    event.global_version = global_start + i as i64;
                    event.metadata.stored = Some(now);
                    rows.push(to_new_row(&event)?);
                    finished.push(event);
                }

                let insert_result = diesel::insert_into(event_store::table)
                    .values(&rows)
                    .execute(conn);

                if let Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) = &insert_result
                {
                    return Err(StoreError::Duplicate {
                        aggregate_id: aggregate_id.clone(),
                        version: expected_version + 1,
                    });
                }
                insert_result?;

                Ok(finished)
            })
        })
        .await
        .map_err(StoreError::from)??;

        Ok(persisted)
    }

    async fn append_batch(
        &self,
        aggregate_id: &str,
        events: Vec<DomainEvent>,
    ) -> Result<Vec<DomainEvent>> {
        reject_empty_aggregate_id(aggregate_id)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let policy = RetryPolicy::event_store_append();
        retry_with_policy(&policy, || async {
            let expected_version = self.current_version(aggregate_id).await?;
            self.save_events(aggregate_id, events.clone(), expected_version).await
        })
        .await
    }

    async fn get_events_for_aggregate(&self, aggregate_id: &str) -> Result<Vec<DomainEvent>> {
        reject_empty_aggregate_id(aggregate_id)?;
        let pool = self.pool.clone();
        let aggregate_id = aggregate_id.to_string();

        let rows = tokio::task::spawn_blocking(move || -> StoreResult<Vec<EventRow>> {
            let mut conn = pool.get()?;
            use event_store::dsl;
            let rows = dsl::event_store
                .filter(dsl::aggregate_id.eq(&aggregate_id))
                .order(dsl::version.asc())
                .select(EventRow::as_select())
                .load(&mut conn)?;
            Ok(rows)
        })
        .await
        .map_err(StoreError::from)??;

        let events: StoreResult<Vec<DomainEvent>> = rows.into_iter().map(DomainEvent::try_from).collect();
        Ok(events?)
    }

    async fn current_version(&self, aggregate_id: &str) -> Result<i64> {
        reject_empty_aggregate_id(aggregate_id)?;
        let pool = self.pool.clone();
        let aggregate_id = aggregate_id.to_string();

        let max: Option<i64> = tokio::task::spawn_blocking(move || -> StoreResult<Option<i64>> {
            let mut conn = pool.get()?;
            use event_store::dsl;
            let max = dsl::event_store
                .filter(dsl::aggregate_id.eq(&aggregate_id))
                .select(diesel::dsl::max(dsl::version))
                .first(&mut conn)?;
            Ok(max)
        })
        .await
        .map_err(StoreError::from)??;

        Ok(max.unwrap_or(0))
    }

    async fn next_global_version(&self, n: i64) -> Result<i64> {
        let pool = self.pool.clone();
        let highest = tokio::task::spawn_blocking(move || -> StoreResult<i64> {
            let mut conn = pool.get()?;
            conn.transaction::<_, StoreError, _>(|conn| Ok(reserve_global_version(conn, n)?))
        })
        .await
        .map_err(StoreError::from)??;
        Ok(highest)
    }
}
