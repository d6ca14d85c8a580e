mod external_config;
mod participants;
mod rooms;
mod sessions;
mod transcripts;
mod work_queue;
mod workers;

pub use external_config::{ConferencingCredentials, TranscriptionProviderConfig};
pub use rooms::ClaimOutcome;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// PostgreSQL client for the coordination store (C1). All remote calls
/// this worker relies on for room ownership, heartbeats, and transcript
/// persistence go through here.
pub struct StoreClient {
    pool: PgPool,
}

impl StoreClient {
    /// Connect to PostgreSQL and return a client with a connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let client = Self { pool };
        client.health_check().await?;
        tracing::info!("PostgreSQL connection established");

        Ok(client)
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running PostgreSQL migrations");

        sqlx::migrate!("src/store/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("PostgreSQL migrations complete");
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("PostgreSQL connection error: {0}")]
    Connection(String),

    #[error("PostgreSQL query error: {0}")]
    Query(String),

    #[error("PostgreSQL migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for meetscribe_common::WorkerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Connection(msg) => meetscribe_common::WorkerError::StoreTransient(msg),
            StoreError::Query(msg) => meetscribe_common::WorkerError::StoreTransient(msg),
            StoreError::Migration(msg) => meetscribe_common::WorkerError::StoreLogical(msg),
            StoreError::NotFound(msg) => meetscribe_common::WorkerError::NotFound(msg),
        }
    }
}
