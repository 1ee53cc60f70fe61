//! Shared store backends for the parish chat backend
//!
//! Provides [`KeyValueStore`] implementations for:
//! - Redis (production; shared by every server instance)
//! - In-memory (tests and single-process development)

pub mod error;
pub mod memory;
pub mod redis_store;

pub use error::PersistenceError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::sync::Arc;

use parish_chat_config::StoreConfig;
use parish_chat_core::KeyValueStore;

/// Connect the configured shared store.
///
/// Callers treat an error as "store unavailable" and run the cache, limiter
/// and breaker in their fallback modes.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, PersistenceError> {
    if !config.enabled {
        return Err(PersistenceError::Disabled);
    }

    let store = RedisStore::connect(config).await?;
    store
        .ping()
        .await
        .map_err(|e| PersistenceError::Connection(e.to_string()))?;

    tracing::info!("Redis store connected");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_store() {
        let config = StoreConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(matches!(connect(&config).await, Err(PersistenceError::Disabled)));
    }
}
