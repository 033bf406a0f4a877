// src/storage/mod.rs
// Relational store bootstrap: connection pool and migrations (design doc
// §5: one SqlitePool, configurable size, default 10, shared via Arc in
// AppState).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    info!("connected to database ({} max connections)", max_connections);
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("migrations applied");
    Ok(())
}

/// In-memory pool with the full schema applied, shared by unit tests
/// across kb/, conversation/, and agents/ so each module's tests don't
/// re-declare the same `CREATE TABLE` statements (telemetry/store.rs and
/// cache/mod.rs predate this helper and keep their own inline schemas).
#[cfg(test)]
pub async fn test_pool_with_schema() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.expect("in-memory sqlite pool");
    sqlx::migrate!("./migrations").run(&pool).await.expect("apply migrations to test pool");
    pool
}
