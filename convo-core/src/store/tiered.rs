//! Primary-then-fallback decorator.

use super::{KvStore, MemoryStore, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Tries the primary tier and degrades to the in-memory fallback on error.
///
/// The two tiers are not synchronised: a value written to the fallback while
/// the primary was down stays there until it is deleted or swept, and is only
/// visible while the primary keeps failing.
pub struct TieredStore {
    primary: Option<Arc<dyn KvStore>>,
    fallback: Arc<MemoryStore>,
}

impl TieredStore {
    pub fn new(primary: Option<Arc<dyn KvStore>>, fallback: Arc<MemoryStore>) -> Self {
        Self { primary, fallback }
    }

    /// Fallback-only store.
    pub fn memory_only() -> Self {
        Self::new(None, Arc::new(MemoryStore::new()))
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// The in-process fallback tier.
    pub fn fallback(&self) -> &Arc<MemoryStore> {
        &self.fallback
    }
}

#[async_trait]
impl KvStore for TieredStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(backend = primary.name(), key, error = %e, "Primary read failed, using fallback");
                }
            }
        }
        self.fallback.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.set_with_ttl(key, value, ttl_secs).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(backend = primary.name(), key, error = %e, "Primary write failed, using fallback");
                }
            }
        }
        self.fallback.set_with_ttl(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.delete(key).await {
                tracing::warn!(backend = primary.name(), key, error = %e, "Primary delete failed");
            }
        }
        self.fallback.delete(key).await
    }

    async fn is_healthy(&self) -> bool {
        match &self.primary {
            Some(primary) => primary.is_healthy().await,
            None => self.fallback.is_healthy().await,
        }
    }

    fn name(&self) -> &str {
        "tiered"
    }

    fn evict_expired(&self, now: i64) -> usize {
        let primary = self.primary.as_ref().map_or(0, |p| p.evict_expired(now));
        primary + self.fallback.evict_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Primary that can be switched off to simulate an outage.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> StoreResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(StoreError::Connection("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
            self.check()?;
            self.inner.set_with_ttl(key, value, ttl_secs).await
        }

        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn is_healthy(&self) -> bool {
            self.check().is_ok()
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn tiered() -> (TieredStore, Arc<FlakyStore>) {
        let primary = Arc::new(FlakyStore::default());
        let store = TieredStore::new(Some(primary.clone()), Arc::new(MemoryStore::new()));
        (store, primary)
    }

    #[tokio::test]
    async fn test_healthy_primary_takes_writes() {
        let (store, primary) = tiered();
        store.set_with_ttl("k", "v", 60).await.unwrap();

        assert_eq!(primary.inner.len(), 1);
        assert!(store.fallback().is_empty());
        assert!(store.is_healthy().await);
    }

    #[tokio::test]
    async fn test_outage_degrades_to_fallback() {
        let (store, primary) = tiered();
        primary.down.store(true, Ordering::SeqCst);

        store.set_with_ttl("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.fallback().len(), 1);
        assert!(!store.is_healthy().await);

        // Recovery does not copy fallback entries back.
        primary.down.store(false, Ordering::SeqCst);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_hits_both_tiers() {
        let (store, primary) = tiered();
        primary.down.store(true, Ordering::SeqCst);
        store.set_with_ttl("k", "old", 60).await.unwrap();
        primary.down.store(false, Ordering::SeqCst);
        store.set_with_ttl("k", "new", 60).await.unwrap();

        store.delete("k").await.unwrap();
        assert!(primary.inner.is_empty());
        assert!(store.fallback().is_empty());
    }

    #[tokio::test]
    async fn test_evict_expired_reaches_primary() {
        let store = TieredStore::new(
            Some(Arc::new(MemoryStore::with_expiry())),
            Arc::new(MemoryStore::new()),
        );
        store.set_with_ttl("k", "v", 1).await.unwrap();

        assert_eq!(store.evict_expired(crate::now_ms() + 1_500), 1);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_only() {
        let store = TieredStore::memory_only();
        assert!(!store.has_primary());
        store.set_with_ttl("k", "v", 60).await.unwrap();
        assert_eq!(store.fallback().keys(), vec!["k".to_string()]);
    }
}
