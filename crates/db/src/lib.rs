//! Data access for rxwatch: the PostgreSQL snapshot source and the JSON
//! state file.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub mod source;
pub mod state;

pub use source::{PgSnapshotSource, SourceError};
pub use state::{JsonFileStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Connections kept open; the monitor runs one query per cycle.
const MAX_CONNECTIONS: u32 = 2;

/// How long a cycle waits for a connection before the fetch fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(15);

/// Create a connection pool from a database URL.
///
/// Connections are opened on first use, so an unreachable database surfaces
/// as a failed fetch instead of a startup error.
pub fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy(database_url)
}

/// Run a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
