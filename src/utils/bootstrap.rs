//! Bootstrap utilities for embedding applications.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::eventstore::Eventstore;

/// Initialize tracing with EVENTSTORE_LOG environment variable.
///
/// Defaults to "info" level if EVENTSTORE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("EVENTSTORE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration from file and environment and build the engine.
pub async fn bootstrap() -> Result<Eventstore> {
    let config = Config::load().map_err(|e| Error::Internal(e.to_string()))?;
    tracing::info!(
        storage_type = %config.storage.storage_type,
        queue_capacity = config.subscriptions.queue_capacity,
        "Bootstrapping eventstore"
    );
    Eventstore::from_config(&config).await
}
