//! Redis-backed durable tier.
//!
//! Values are written with `SET key value EX ttl`, so Redis expires idle
//! sessions on its own. Every command is bounded by the configured timeout;
//! a slow Redis counts as an unavailable one.

use super::{KvStore, StoreError, StoreResult};
use async_trait::async_trait;
use convo_common::config::RedisStoreConfig;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;

/// Durable session tier on Redis.
pub struct RedisStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    /// Connect using the configured URL.
    pub async fn connect(config: &RedisStoreConfig) -> StoreResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Connection("no redis url configured".into()))?;

        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let conn = tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_io_error() || e.is_connection_dropped() => {
                Err(StoreError::Connection(e.to_string()))
            }
            Ok(Err(e)) => Err(StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs.max(1))
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<i64>(&mut conn)
                .await
        })
        .await
        .map(|_| ())
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        match self
            .bounded(async move { redis::cmd("PING").query_async::<String>(&mut conn).await })
            .await
        {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "redis"
    }
}
