//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::error::{Error, Result};

mod event_store;
pub mod helpers;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use event_store::EventStore;
pub use memory::MemoryEventStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    info!(storage_type = %config.storage_type, path = %config.path, "Initializing storage");

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryEventStore::new())),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            use std::str::FromStr;
            use std::time::Duration;

            use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Internal(format!("cannot create {}: {e}", parent.display()))
                })?;
            }

            let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?;

            let event_store = SqliteEventStore::new(pool);
            event_store.init().await?;
            Ok(Arc::new(event_store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(Error::Internal("sqlite feature not enabled".to_string()))
        }
    }
}
