//! Session model and the read-merge-write session store.

use crate::now_ms;
use crate::state::StateTag;
use crate::store::{KvStore, MemoryStore, TieredStore};
use convo_common::config::SessionConfig;
use convo_common::util::mask_participant;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Open field map accumulated over a conversation.
pub type SessionData = Map<String, Value>;

// ============================================================================
// Session Model
// ============================================================================

/// One participant's conversational progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    /// Wire form of the current state tag. Kept as a string so that corrupted
    /// records survive the read and can be recovered by the router.
    pub state: String,
    pub data: SessionData,
    /// Epoch ms of the last successful save.
    pub last_activity: i64,
    /// True only for a default session synthesized on read.
    pub is_new: bool,
}

impl Session {
    /// Default session for an id with no stored record.
    pub fn fresh(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: StateTag::Home.as_str().to_string(),
            data: SessionData::new(),
            last_activity: now_ms(),
            is_new: true,
        }
    }

    /// Parsed state tag, `None` if the stored string is not in the registry.
    pub fn tag(&self) -> Option<StateTag> {
        StateTag::parse(&self.state)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    fn from_record(id: &str, record: SessionRecord) -> Self {
        Self {
            id: id.to_string(),
            state: record.state,
            data: record.data,
            last_activity: record.last_activity,
            is_new: record.is_new,
        }
    }

    fn to_record(&self) -> SessionRecord {
        SessionRecord {
            state: self.state.clone(),
            data: self.data.clone(),
            last_activity: self.last_activity,
            is_new: self.is_new,
        }
    }
}

/// Persisted form of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    state: String,
    #[serde(default)]
    data: SessionData,
    last_activity: i64,
    #[serde(default)]
    is_new: bool,
}

// ============================================================================
// Session Store
// ============================================================================

/// Per-participant session persistence over a tiered key/value store.
///
/// Store failures never reach callers. Reads that fail or return an
/// undecodable record yield a fresh session; failed writes are logged.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<TieredStore>,
    ttl_secs: u64,
    key_prefix: String,
}

impl SessionStore {
    pub fn new(kv: Arc<TieredStore>, config: &SessionConfig) -> Self {
        Self {
            kv,
            ttl_secs: config.ttl_secs,
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Store over a fallback-only tier with default settings.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(TieredStore::memory_only()), &SessionConfig::default())
    }

    /// Namespaced store key for a participant.
    pub fn session_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// The in-process tier swept by the timeout monitor.
    pub fn fallback_tier(&self) -> Arc<MemoryStore> {
        self.kv.fallback().clone()
    }

    /// Drop records the primary tier has already expired but still holds.
    pub fn evict_expired(&self, now: i64) -> usize {
        self.kv.evict_expired(now)
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Read the session for `id`, or a transient default if none is stored.
    ///
    /// The default is not persisted.
    pub async fn get(&self, id: &str) -> Session {
        let key = self.session_key(id);
        let raw = match self.kv.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(user_id = %mask_participant(id), error = %e, "Session read failed");
                None
            }
        };

        let Some(raw) = raw else {
            return Session::fresh(id);
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => Session::from_record(id, record),
            Err(e) => {
                tracing::warn!(user_id = %mask_participant(id), error = %e, "Discarding undecodable session record");
                Session::fresh(id)
            }
        }
    }

    /// Read-merge-write: overwrite the state when given, shallow-merge `patch`
    /// into the data map, stamp activity and refresh the expiry window.
    ///
    /// Not atomic. Callers serialise saves per participant.
    pub async fn save(&self, id: &str, state: Option<StateTag>, patch: SessionData) -> Session {
        let mut session = self.get(id).await;
        if let Some(state) = state {
            session.state = state.as_str().to_string();
        }
        session.data.extend(patch);
        session.last_activity = now_ms();
        session.is_new = false;

        self.write(&session).await;
        session
    }

    /// Write a full session record as-is.
    pub async fn write(&self, session: &Session) {
        let key = self.session_key(&session.id);
        let encoded = match serde_json::to_string(&session.to_record()) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(user_id = %mask_participant(&session.id), error = %e, "Session encode failed");
                return;
            }
        };

        if let Err(e) = self.kv.set_with_ttl(&key, &encoded, self.ttl_secs).await {
            tracing::error!(user_id = %mask_participant(&session.id), error = %e, "Session write failed");
        }
    }

    /// Remove the session from every tier.
    pub async fn delete(&self, id: &str) {
        let key = self.session_key(id);
        if let Err(e) = self.kv.delete(&key).await {
            tracing::error!(user_id = %mask_participant(id), error = %e, "Session delete failed");
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.kv.is_healthy().await
    }
}

// ============================================================================
// Participant Locks
// ============================================================================

/// One async mutex per participant.
///
/// Held across a whole dispatch (read, handle, write) and across a deferred
/// completion, so the two never interleave their read-merge-write cycles.
/// Waiters are granted the lock in arrival order.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits for.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
