//! Shared key-value store trait

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("store timed out")]
    Timeout,
}

/// Cross-instance coordination store
///
/// Every server instance talks to the same store, so all mutations used by
/// the cache, limiter and breaker must be safe under concurrent callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one. `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remaining lifetime. `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Atomically increment a counter, creating it at 1 with `ttl_on_create`
    /// when absent. The expiry of an existing counter is left untouched.
    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64, StoreError>;

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn list_set(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    fn name(&self) -> &str;
}
