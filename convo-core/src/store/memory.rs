//! In-process key/value tier.

use super::{KvStore, StoreResult};
use crate::now_ms;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// Epoch ms of the last write.
    written_at: i64,
    /// Epoch ms after which the entry reads as absent.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Concurrent in-process map.
///
/// As a fallback tier it keeps entries until they are deleted or evicted by
/// [`MemoryStore::evict_idle`]; TTLs passed to `set_with_ttl` are ignored.
/// Built with [`MemoryStore::with_expiry`] it honours TTLs lazily on read and
/// can stand in for a durable primary in single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    honour_ttl: bool,
}

impl MemoryStore {
    /// Fallback tier: no automatic expiry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standalone tier that expires entries after their TTL.
    pub fn with_expiry() -> Self {
        Self {
            entries: DashMap::new(),
            honour_ttl: true,
        }
    }

    /// Remove entries whose last write is older than `threshold_ms`.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_idle(&self, now: i64, threshold_ms: u64) -> usize {
        let threshold = i64::try_from(threshold_ms).unwrap_or(i64::MAX);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.written_at) <= threshold && !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Remove entries past their TTL without waiting for a read.
    pub fn evict_expired_at(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = now_ms();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let now = now_ms();
        let expires_at = self.honour_ttl.then(|| {
            let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            now.saturating_add(ttl_ms)
        });
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                written_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn evict_expired(&self, now: i64) -> usize {
        self.evict_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set_with_ttl("a", "1", 60).await.unwrap();
        store.set_with_ttl("a", "2", 60).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_ignores_ttl() {
        let store = MemoryStore::new();
        store.set_with_ttl("a", "1", 0).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_with_expiry_honours_ttl() {
        let store = MemoryStore::with_expiry();
        store.set_with_ttl("gone", "1", 0).await.unwrap();
        store.set_with_ttl("kept", "1", 600).await.unwrap();

        assert!(store.get("gone").await.unwrap().is_none());
        assert_eq!(store.get("kept").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_evict_expired_without_reads() {
        let store = MemoryStore::with_expiry();
        store.set_with_ttl("a", "1", 1).await.unwrap();
        store.set_with_ttl("b", "1", 60).await.unwrap();

        let now = now_ms();
        assert_eq!(store.evict_expired(now), 0);
        assert_eq!(store.evict_expired(now + 1_500), 1);
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_has_nothing_to_expire() {
        let store = MemoryStore::new();
        store.set_with_ttl("a", "1", 1).await.unwrap();
        assert_eq!(store.evict_expired(now_ms() + 60_000), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let store = MemoryStore::new();
        store.set_with_ttl("a", "1", 60).await.unwrap();
        store.set_with_ttl("b", "1", 60).await.unwrap();

        let now = now_ms();
        assert_eq!(store.evict_idle(now, 60_000), 0);
        assert_eq!(store.evict_idle(now + 60_001, 60_000), 2);
        assert!(store.is_empty());
    }
}
