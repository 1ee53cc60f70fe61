//! Redis-backed shared store
//!
//! One multiplexed connection is shared by all handlers; each command clones
//! the handle and runs under the configured command timeout.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::time::Duration;

use parish_chat_config::StoreConfig;
use parish_chat_core::{KeyValueStore, StoreError};

use crate::error::{map_redis_error, PersistenceError};

/// INCR that sets the expiry only when the counter is created
const INCR_WITH_EXPIRY: &str = r#"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
"#;

#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    incr_script: redis::Script,
    command_timeout: Duration,
}

impl RedisStore {
    /// Open a client and establish the multiplexed connection
    pub async fn connect(config: &StoreConfig) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| PersistenceError::InvalidUrl(e.to_string()))?;

        tracing::info!(url = %redact_url(&config.url), "Connecting to Redis");

        let connection = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| PersistenceError::ConnectTimeout(config.connect_timeout_ms))?
        .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        Ok(Self {
            connection,
            incr_script: redis::Script::new(INCR_WITH_EXPIRY),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        self.run(async move {
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
            Ok(count > 0)
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            // -2: missing, -1: no expiry
            let ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
            Ok(if ms >= 0 {
                Some(Duration::from_millis(ms as u64))
            } else {
                None
            })
        })
        .await
    }

    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        let invocation = {
            let mut inv = self.incr_script.key(key);
            inv.arg(ttl_on_create.as_millis().max(1) as u64);
            inv
        };
        self.run(async move {
            let count: i64 = invocation.invoke_async(&mut conn).await?;
            Ok(count)
        })
        .await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let _: i64 = redis::cmd("SADD").arg(key).arg(member).query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn list_set(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query_async(&mut conn).await?;
            Ok(members)
        })
        .await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let _: i64 = redis::cmd("SREM").arg(key).arg(member).query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.run(async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// Hide the password part of a redis URL for logging
pub(crate) fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        },
        _ => url.to_string(),
    }
}
