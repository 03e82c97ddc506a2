//! Database connection pool management.

use crate::StoreConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Type alias for the database pool.
pub type Pool = SqlitePool;

/// Create a new database connection pool.
///
/// In-memory databases vanish with their connection, so their connections
/// are never retired.
pub async fn create_pool(config: &StoreConfig) -> Result<Pool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let mut pool = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.is_in_memory() {
        pool = pool.idle_timeout(None).max_lifetime(None);
    }
    pool.connect_with(options).await
}

/// Run database migrations.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
