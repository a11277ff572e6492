//! Key/value storage tiers behind the session store.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 TieredStore                  │
//! │  ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ primary (opt.)   │──▶│ MemoryStore     │  │
//! │  │ Redis / Memory   │err│ fallback tier   │  │
//! │  └──────────────────┘   └─────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Any key/value store with per-key expiry can serve as the primary tier by
//! implementing [`KvStore`].

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;
mod tiered;

pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;
pub use tiered::TieredStore;

use async_trait::async_trait;
use convo_common::config::{StoreBackend, StoreConfig};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage tier errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the backend.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A command did not complete within its deadline.
    #[error("Store operation timed out after {0}ms")]
    Timeout(u64),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend rejected a command.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Minimal key/value interface with per-key expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Missing or expired keys yield `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value and (re)start its expiry window.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Check whether the backend is reachable.
    async fn is_healthy(&self) -> bool;

    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Drop entries whose TTL has passed. Returns the dropped count.
    ///
    /// Backends that expire keys themselves keep the default.
    fn evict_expired(&self, _now: i64) -> usize {
        0
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Build the tiered store described by the configuration.
///
/// A Redis primary that cannot be reached at startup is logged and skipped;
/// the service then runs on the fallback tier alone.
pub async fn build_store(config: &StoreConfig) -> TieredStore {
    let fallback = Arc::new(MemoryStore::new());

    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory session store");
            TieredStore::new(Some(Arc::new(MemoryStore::with_expiry())), fallback)
        }
        StoreBackend::Redis => {
            let primary = connect_redis(config).await;
            TieredStore::new(primary, fallback)
        }
    }
}

#[cfg(feature = "redis-backend")]
async fn connect_redis(config: &StoreConfig) -> Option<Arc<dyn KvStore>> {
    match RedisStore::connect(&config.redis).await {
        Ok(store) => {
            tracing::info!("Connected to Redis session store");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable at startup, using in-memory fallback only");
            None
        }
    }
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_redis(_config: &StoreConfig) -> Option<Arc<dyn KvStore>> {
    tracing::warn!(
        "Redis backend requested but the redis-backend feature is not enabled. \
         Falling back to in-memory store."
    );
    None
}
