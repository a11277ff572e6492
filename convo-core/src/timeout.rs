//! Inactivity timeout.
//!
//! `check` runs at the start of every dispatch. The durable tier expires idle
//! records through its own TTL; the in-memory fallback tier has no expiry and
//! is swept periodically instead. The sweep also drops records an in-process
//! primary has expired but not yet been asked for again.

use crate::notify::Notifier;
use crate::now_ms;
use crate::session::{SessionLocks, SessionStore};
use convo_common::util::mask_participant;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reply sent when a conversation has been idle too long.
pub const TIMEOUT_NOTICE: &str =
    "Your session expired due to inactivity. Say hi to start again.";

/// Result of [`TimeoutMonitor::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutCheck {
    pub timed_out: bool,
    pub message: Option<String>,
}

impl TimeoutCheck {
    fn active() -> Self {
        Self {
            timed_out: false,
            message: None,
        }
    }

    fn expired() -> Self {
        Self {
            timed_out: true,
            message: Some(TIMEOUT_NOTICE.to_string()),
        }
    }
}

pub struct TimeoutMonitor {
    store: SessionStore,
    threshold_ms: u64,
    locks: Option<Arc<SessionLocks>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TimeoutMonitor {
    pub fn new(store: SessionStore, threshold_ms: u64) -> Self {
        Self {
            store,
            threshold_ms,
            locks: None,
            notifier: None,
        }
    }

    /// Also prune idle participant locks on every sweep.
    pub fn with_locks(mut self, locks: Arc<SessionLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Also let the notifier forget participants whose records are gone.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// Clear the session if it has been idle past the threshold.
    ///
    /// Sessions that are still active, or have never been saved, are left
    /// untouched.
    pub async fn check(&self, participant_id: &str) -> TimeoutCheck {
        let session = self.store.get(participant_id).await;
        if session.is_new {
            return TimeoutCheck::active();
        }

        let idle_ms = now_ms().saturating_sub(session.last_activity);
        if idle_ms <= i64::try_from(self.threshold_ms).unwrap_or(i64::MAX) {
            return TimeoutCheck::active();
        }

        self.store.delete(participant_id).await;
        tracing::info!(
            user_id = %mask_participant(participant_id),
            idle_ms,
            state = %session.state,
            "Session timed out"
        );
        TimeoutCheck::expired()
    }

    /// Evict idle fallback entries and expired primary entries. Returns the
    /// evicted count.
    pub fn sweep(&self) -> usize {
        self.sweep_at(now_ms())
    }

    fn sweep_at(&self, now: i64) -> usize {
        let idle = self.store.fallback_tier().evict_idle(now, self.threshold_ms);
        let expired = self.store.evict_expired(now);
        if let Some(locks) = &self.locks {
            locks.prune();
        }
        if let Some(notifier) = &self.notifier {
            let record_lifetime_ms = self.store.ttl_secs().saturating_mul(1000);
            let forgotten = notifier.forget_idle(now, record_lifetime_ms);
            if forgotten > 0 {
                tracing::debug!(forgotten, "Dropped idle delivery routes");
            }
        }
        if idle + expired > 0 {
            tracing::info!(idle, expired, "Swept sessions from store");
        }
        idle + expired
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        })
    }
}
