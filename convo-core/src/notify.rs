//! Outbound notification channel.
//!
//! Deferred results, failure apologies and timeout notices reach participants
//! out-of-band through a [`Notifier`].

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

/// Delivery failures. Callers log these; they never change session state.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("No channel can reach participant {0}")]
    Unroutable(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Sends a text message to a participant.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, participant_id: &str, text: &str) -> Result<(), NotifyError>;

    /// Drop per-participant delivery state not refreshed within `idle_ms`.
    /// Called from the session sweep; returns the dropped count.
    fn forget_idle(&self, _now: i64, _idle_ms: u64) -> usize {
        0
    }
}

/// Notifier that keeps every message in memory.
///
/// Used by the local CLI channel and by tests that assert on deliveries.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(String, String)>>,
    changed: Notify,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(participant_id, text)` pairs delivered so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Messages delivered to one participant.
    pub fn sent_to(&self, participant_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| id == participant_id)
            .map(|(_, text)| text)
            .collect()
    }

    /// Wait until at least `count` messages have been delivered.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_for(&self, count: usize, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            if self.sent().len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent().len() >= count;
            }
        }
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, participant_id: &str, text: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("notifier lock poisoned".into()))?
            .push((participant_id.to_string(), text.to_string()));
        self.changed.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        notifier.send("a", "one").await.unwrap();
        notifier.send("b", "two").await.unwrap();
        notifier.send("a", "three").await.unwrap();

        assert_eq!(notifier.sent().len(), 3);
        assert_eq!(notifier.sent_to("a"), vec!["one", "three"]);
    }

    #[tokio::test]
    async fn test_wait_for() {
        let notifier = Arc::new(MemoryNotifier::new());
        assert!(!notifier.wait_for(1, Duration::from_millis(20)).await);

        let sender = notifier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.send("a", "hello").await.unwrap();
        });
        assert!(notifier.wait_for(1, Duration::from_secs(2)).await);
    }
}
