use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::config::AppConfig;
use crate::infrastructure::persistence::error::DbError;
use crate::utils::logging;

/// Manages the database connection pool
pub struct DbPool {
    connection: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured database URL
    pub async fn new(config: &AppConfig) -> Result<Self, DbError> {
        Self::connect(&config.database.url).await
    }

    /// Connect to an explicit URL (tests use `sqlite::memory:`)
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let mut options = ConnectOptions::new(url);
        if url.starts_with("sqlite::memory:") {
            // every pooled connection would otherwise get its own
            // private in-memory database
            options.max_connections(1);
        }
        match Database::connect(options).await {
            Ok(connection) => {
                logging::log_info("Database connection established");
                Ok(DbPool { connection })
            }
            Err(e) => {
                logging::log_error(&format!("Failed to connect to database: {}", e));
                Err(DbError::Connection(e.to_string()))
            }
        }
    }

    pub fn get_connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}
