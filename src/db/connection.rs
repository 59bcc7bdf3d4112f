use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::MemnonError;

/// Shared read-only connection pool. Each search strategy borrows a
/// connection and releases it; no transactions are held across calls.
pub type MemnonPool = sqlx::PgPool;

/// Connect to PostgreSQL. Connection failure is a configuration error and
/// aborts startup.
pub async fn connect(config: &DatabaseConfig) -> Result<MemnonPool, MemnonError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
        .connect(&config.url)
        .await
        .map_err(|e| {
            MemnonError::Configuration(format!("Failed to connect to database: {}", e))
        })?;
    info!("Database connected ({} connections max)", config.max_connections);
    Ok(pool)
}

/// Verify that the pgvector extension is installed. Cosine-ranked search is
/// not optional, so absence aborts startup.
pub async fn check_vector_capability(pool: &MemnonPool) -> Result<(), MemnonError> {
    let version: Option<(String,)> =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(pool)
            .await?;

    match version {
        Some((version,)) => {
            info!("pgvector extension found (version {})", version);
            Ok(())
        }
        None => Err(MemnonError::Configuration(
            "pgvector extension is not installed".to_string(),
        )),
    }
}
