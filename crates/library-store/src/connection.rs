//! Database connection pool, following the teacher's `db::session` shape
//! (`diesel::r2d2` over `PgConnection`) but sized from
//! `library_core::config::StoreConfig` instead of a bare env var.

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use library_core::config::StoreConfig;
use library_core::error::LibraryError;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the connection pool used by the event store and every projection
/// repository. Call once at process startup.
pub fn init_pool(config: &StoreConfig) -> Result<DbPool, LibraryError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    Pool::builder()
        .max_size(config.max_pool_size)
        .build(manager)
        .map_err(|e| LibraryError::EventStoreUnavailable {
            message: format!("failed to build database connection pool: {e}"),
        })
}
