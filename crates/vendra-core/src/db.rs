//! Database access utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::Result;

/// Build a Postgres pool from configuration. Connections are established
/// lazily so startup does not block on a cold database.
pub fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect_lazy(&config.url())
        .map_err(|e| crate::Error::Config(format!("Failed to create pool: {}", e)))?;

    Ok(pool)
}

/// Connectivity probe used by readiness checks
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
