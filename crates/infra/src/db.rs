//! Postgres connection pool and schema wiring.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

const SCHEMA: &str = include_str!("../migrations/0001_generation_engine.sql");

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply the engine schema. Every statement is `IF NOT EXISTS`, so this runs on
/// each start.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("generation engine schema applied");
    Ok(())
}
