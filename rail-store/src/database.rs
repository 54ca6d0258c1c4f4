use rail_core::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Classify a driver error into the domain taxonomy.
pub(crate) fn store_error(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::Database(ref db) if db.is_check_violation() => {
            CoreError::Corrupted(format!("constraint violated: {}", db))
        }
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            CoreError::Internal(format!("unique constraint violated: {}", db))
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => CoreError::StoreUnavailable(err.to_string()),
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => CoreError::Corrupted(err.to_string()),
        other => CoreError::Internal(other.to_string()),
    }
}

/// Narrow an integer column into a domain count.
pub(crate) fn count(value: i32, column: &str) -> Result<u32, CoreError> {
    u32::try_from(value).map_err(|_| CoreError::Corrupted(format!("negative {}: {}", column, value)))
}
