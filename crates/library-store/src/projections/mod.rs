//! # Projection Repositories (spec §4.3)
//!
//! Each read model is a document keyed by aggregate `id`, carrying its own
//! `version` used as a fencing token so replayed/duplicate events can never
//! regress a projection (`updateIfNewer`). Soft-deletes set `deletedAt`
//! rather than removing the row — the event stream never shrinks, and
//! neither does its read side.
//!
//! `book.rs`/`reservation.rs`/`wallet.rs` each declare a concrete,
//! diesel-backed repository over the table schema defines for that
//! aggregate kind; the shared CRUD shape lives once in the
//! `diesel_projection_repository!` macro below rather than being retyped
//! per aggregate, the way the teacher's `db::events` handlers factor out
//! their repeated connection/transaction boilerplate.

mod book;
mod reservation;
mod wallet;

pub use book::BookProjectionRepository;
pub use reservation::ReservationProjectionRepository;
pub use wallet::WalletProjectionRepository;

use async_trait::async_trait;
use library_core::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One page of a `getAll` query (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub(crate) fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

/// `{data, pagination{total,page,limit,pages,hasNext,hasPrev}}` (spec §4.3).
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub(crate) fn new(total: i64, page: Page) -> Self {
        let pages = if total <= 0 {
            0
        } else {
            ((total as f64) / (page.limit as f64)).ceil() as u32
        };
        Self {
            total,
            page: page.page,
            limit: page.limit,
            pages,
            has_next: (page.page as u32) < pages,
            has_prev: page.page > 1,
        }
    }
}

/// The version-fenced write operations shared by every projection kind,
/// none of which reference the document shape `T` — split out of
/// `ProjectionRepository<T>` so calling them doesn't leave the compiler
/// needing to infer a `T` with nothing in the call to infer it from.
#[async_trait]
pub trait ProjectionWriter: Send + Sync {
    /// `$set changes` only if stored `version < incoming_version`, then sets
    /// `version = incoming_version`. Returns the number of rows matched (0
    /// or 1) so callers can distinguish "already applied" from "missing".
    async fn update_if_newer(&self, id: &str, changes: serde_json::Value, incoming_version: i64) -> Result<u64>;

    /// Non-versioned `$set`, for fields commutative across event order.
    async fn simple_update(&self, id: &str, changes: serde_json::Value) -> Result<u64>;

    /// Sets `deletedAt`/`version`; idempotent under retry via the version guard.
    async fn mark_deleted(&self, id: &str, version: i64, timestamp: chrono::DateTime<chrono::Utc>) -> Result<u64>;
}

/// The per-aggregate-kind read model contract (spec §4.3). `T` is the
/// plain-data snapshot shape a caller deserializes the stored document
/// into (e.g. `BookProps` plus any denormalized fields).
#[async_trait]
pub trait ProjectionRepository<T>: ProjectionWriter
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Insert-or-upsert on `id`.
    async fn save(&self, id: &str, version: i64, document: &T) -> Result<()>;

    /// `includeDeleted=false` filters out soft-deleted rows.
    async fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<Option<T>>;

    /// Paginated listing, soft-deleted rows excluded unless `include_deleted`.
    async fn get_all(&self, page: Page, include_deleted: bool) -> Result<PaginatedResult<T>>;
}

/// Generates a diesel-backed `ProjectionRepository<T>` impl for the
/// `(id, version, deleted_at, document)` table shape every projection
/// table shares.
macro_rules! diesel_projection_repository {
    ($repo:ident, $table:ident, $kind:expr) => {
        /// Diesel-backed projection repository over `
        #[doc = stringify!($table)]
        /// `.
        pub struct $repo {
            pool: crate::connection::DbPool,
        }

        impl $repo {
            pub fn new(pool: crate::connection::DbPool) -> Self {
                Self { pool }
            }
        }

        #[async_trait::async_trait]
        impl crate::projections::ProjectionWriter for $repo {
            async fn update_if_newer(
                &self,
                id: &str,
                changes: serde_json::Value,
                incoming_version: i64,
            ) -> library_core::error::Result<u64> {
                let pool = self.pool.clone();
                let id = id.to_string();
                let table_name = stringify!($table);

                let affected = tokio::task::spawn_blocking(move || -> crate::event_store::StoreResult<u64> {
                    let mut conn = pool.get()?;
                    let rows = diesel::sql_query(format!(
                        "UPDATE {table} SET document = document || $1::jsonb, version = $2 \
                         WHERE id = $3 AND version < $2",
                        table = table_name
                    ))
                    .bind::<diesel::sql_types::Jsonb, _>(changes)
                    .bind::<diesel::sql_types::BigInt, _>(incoming_version)
                    .bind::<diesel::sql_types::Text, _>(id)
                    .execute(&mut conn)?;
                    Ok(rows as u64)
                })
                .await
                .map_err(crate::event_store::StoreError::from)??;
                Ok(affected)
            }

            async fn simple_update(&self, id: &str, changes: serde_json::Value) -> library_core::error::Result<u64> {
                let pool = self.pool.clone();
                let id = id.to_string();
                let table_name = stringify!($table);

                let affected = tokio::task::spawn_blocking(move || -> crate::event_store::StoreResult<u64> {
                    let mut conn = pool.get()?;
                    let rows = diesel::sql_query(format!(
                        "UPDATE {table} SET document = document || $1::jsonb WHERE id = $2",
                        table = table_name
                    ))
                    .bind::<diesel::sql_types::Jsonb, _>(changes)
                    .bind::<diesel::sql_types::Text, _>(id)
                    .execute(&mut conn)?;
                    Ok(rows as u64)
                })
                .await
                .map_err(crate::event_store::StoreError::from)??;
                Ok(affected)
            }

            async fn mark_deleted(
                &self,
                id: &str,
                version: i64,
                timestamp: chrono::DateTime<chrono::Utc>,
            ) -> library_core::error::Result<u64> {
                let pool = self.pool.clone();
                let id = id.to_string();

                let affected = tokio::task::spawn_blocking(move || -> crate::event_store::StoreResult<u64> {
                    use crate::schema::$table::dsl;
                    let mut conn = pool.get()?;
                    let rows = diesel::update(dsl::$table.filter(dsl::id.eq(&id).and(dsl::version.lt(version))))
                        .set((dsl::deleted_at.eq(Some(timestamp)), dsl::version.eq(version)))
                        .execute(&mut conn)?;
                    Ok(rows as u64)
                })
                .await
                .map_err(crate::event_store::StoreError::from)??;
                Ok(affected)
            }
        }

        #[async_trait::async_trait]
        impl<T> crate::projections::ProjectionRepository<T> for $repo
        where
            T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
        {
            async fn save(&self, id: &str, version: i64, document: &T) -> library_core::error::Result<()> {
                if id.trim().is_empty() {
                    return Err(library_core::error::LibraryError::validation(
                        concat!($kind, " projection requires a non-empty id"),
                    ));
                }
                let pool = self.pool.clone();
                let id = id.to_string();
                let document = serde_json::to_value(document)
                    .map_err(|e| library_core::error::LibraryError::SerializationError { message: e.to_string() })?;

                tokio::task::spawn_blocking(move || -> crate::event_store::StoreResult<()> {
                    use crate::schema::$table::dsl;
                    let mut conn = pool.get()?;
                    diesel::insert_into(dsl::$table)
                        .values((
                            dsl::id.eq(id.clone()),
                            dsl::version.eq(version),
                            dsl::deleted_at.eq(Option::<chrono::DateTime<chrono::Utc>>::None),
                            dsl::document.eq(document.clone()),
                        ))
                        .on_conflict(dsl::id)
                        .do_update()
                        .set((
                            dsl::version.eq(version),
                            dsl::deleted_at.eq(Option::<chrono::DateTime<chrono::Utc>>::None),
                            dsl::document.eq(document.clone()),
                        ))
                        .execute(&mut conn)?;
                    Ok(())
                })
                .await
                .map_err(crate::event_store::StoreError::from)??;
                Ok(())
            }

            async fn get_by_id(&self, id: &str, include_deleted: bool) -> library_core::error::Result<Option<T>> {
                let pool = self.pool.clone();
                let id = id.to_string();

                let document = tokio::task::spawn_blocking(move || -> crate::event_store::StoreResult<Option<serde_json::Value>> {
                    use crate::schema::$table::dsl;
                    let mut conn = pool.get()?;
                    let mut query = dsl::$table.filter(dsl::id.eq(&id)).into_boxed();
                    if !include_deleted {
                        query = query.filter(dsl::deleted_at.is_null());
                    }
                    let document = query.select(dsl::document).first::<serde_json::Value>(&mut conn).optional()?;
                    Ok(document)
                })
                .await
                .map_err(crate::event_store::StoreError::from)??;

                match document {
                    Some(value) => {
                        let parsed: T = serde_json::from_value(value)
                            .map_err(|e| library_core::error::LibraryError::SerializationError { message: e.to_string() })?;
                        Ok(Some(parsed))
                    }
                    None => Ok(None),
                }
            }

            async fn get_all(
                &self,
                page: crate::projections::Page,
                include_deleted: bool,
            ) -> library_core::error::Result<crate::projections::PaginatedResult<T>> {
                let pool = self.pool.clone();

                let (total, documents) = tokio::task::spawn_blocking(
                    move || -> crate::event_store::StoreResult<(i64, Vec<serde_json::Value>)> {
                        use crate::schema::$table::dsl;
                        let mut conn = pool.get()?;

                        let mut count_query = dsl::$table.into_boxed();
                        if !include_deleted {
                            count_query = count_query.filter(dsl::deleted_at.is_null());
                        }
                        let total: i64 = count_query.count().get_result(&mut conn)?;

                        let mut rows_query = dsl::$table.into_boxed();
                        if !include_deleted {
                            rows_query = rows_query.filter(dsl::deleted_at.is_null());
                        }
                        let documents = rows_query
                            .order(dsl::id.asc())
                            .limit(page.limit as i64)
                            .offset(page.offset())
                            .select(dsl::document)
                            .load::<serde_json::Value>(&mut conn)?;

                        Ok((total, documents))
                    },
                )
                .await
                .map_err(crate::event_store::StoreError::from)??;

                let data: std::result::Result<Vec<T>, serde_json::Error> =
                    documents.into_iter().map(serde_json::from_value).collect();
                let data = data.map_err(|e| library_core::error::LibraryError::SerializationError { message: e.to_string() })?;

                Ok(crate::projections::PaginatedResult {
                    data,
                    pagination: crate::projections::Pagination::new(total, page),
                })
            }
        }

        #[allow(unused_imports)]
        use diesel::prelude::*;
    };
}

pub(crate) use diesel_projection_repository;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_computes_pages_and_edges() {
        let page = Page::new(2, 10);
        let pagination = Pagination::new(25, page);
        assert_eq!(pagination.pages, 3);
        assert!(pagination.has_next);
        assert!(pagination.has_prev);
    }

    #[test]
    fn pagination_first_page_has_no_prev() {
        let page = Page::new(1, 10);
        let pagination = Pagination::new(5, page);
        assert_eq!(pagination.pages, 1);
        assert!(!pagination.has_next);
        assert!(!pagination.has_prev);
    }

    #[test]
    fn pagination_empty_result_has_zero_pages() {
        let page = Page::new(1, 10);
        let pagination = Pagination::new(0, page);
        assert_eq!(pagination.pages, 0);
        assert!(!pagination.has_next);
    }
}
