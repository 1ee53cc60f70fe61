//! Persistence errors

use parish_chat_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Store disabled by configuration")]
    Disabled,
}

impl From<PersistenceError> for parish_chat_core::Error {
    fn from(err: PersistenceError) -> Self {
        parish_chat_core::Error::Store(err.to_string())
    }
}

/// Classify a redis error as transport-level or command-level
pub(crate) fn map_redis_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        StoreError::Unavailable(err.to_string())
    } else if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Command(err.to_string())
    }
}
