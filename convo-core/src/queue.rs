//! Per-participant dispatch queues.
//!
//! Messages from one participant are dispatched strictly in arrival order by a
//! dedicated worker; different participants run concurrently. A worker that
//! stays idle exits and is respawned on the next message.

use crate::router::{Reply, StateRouter};
use convo_common::util::mask_participant;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

/// How long a worker waits for the next message before exiting.
const DEFAULT_IDLE: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Dispatch worker for {0} stopped before replying")]
    Dropped(String),
}

struct Inbound {
    text: String,
    reply: oneshot::Sender<Reply>,
}

type QueueMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Inbound>>>>;

/// Single-writer queue per participant in front of a [`StateRouter`].
pub struct DispatchQueues {
    router: Arc<StateRouter>,
    queues: QueueMap,
    idle: Duration,
}

impl DispatchQueues {
    pub fn new(router: Arc<StateRouter>) -> Self {
        Self::with_idle(router, DEFAULT_IDLE)
    }

    pub fn with_idle(router: Arc<StateRouter>, idle: Duration) -> Self {
        Self {
            router,
            queues: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    pub fn router(&self) -> &Arc<StateRouter> {
        &self.router
    }

    /// Enqueue a message; the reply arrives on the returned receiver.
    pub async fn submit(&self, participant_id: &str, text: impl Into<String>) -> oneshot::Receiver<Reply> {
        let (reply, rx) = oneshot::channel();
        let mut inbound = Inbound {
            text: text.into(),
            reply,
        };

        let mut queues = self.queues.lock().await;
        if let Some(sender) = queues.get(participant_id) {
            match sender.send(inbound) {
                Ok(()) => return rx,
                // Worker exited between idle check and removal; respawn below.
                Err(err) => inbound = err.0,
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.spawn_worker(participant_id.to_string(), receiver);
        // A fresh receiver is alive, so this cannot fail.
        let _ = sender.send(inbound);
        queues.insert(participant_id.to_string(), sender);
        rx
    }

    /// Enqueue a message and wait for its reply.
    pub async fn dispatch(&self, participant_id: &str, text: impl Into<String>) -> Result<Reply, QueueError> {
        self.submit(participant_id, text)
            .await
            .await
            .map_err(|_| QueueError::Dropped(mask_participant(participant_id)))
    }

    /// Number of participants with a live worker.
    pub async fn active(&self) -> usize {
        self.queues.lock().await.len()
    }

    fn spawn_worker(&self, participant_id: String, mut receiver: mpsc::UnboundedReceiver<Inbound>) {
        let router = self.router.clone();
        let queues = self.queues.clone();
        let idle = self.idle;

        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle, receiver.recv()).await {
                    Ok(Some(inbound)) => {
                        let reply = router.dispatch(&participant_id, &inbound.text).await;
                        if inbound.reply.send(reply).is_err() {
                            tracing::debug!(
                                user_id = %mask_participant(&participant_id),
                                "Reply receiver dropped"
                            );
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        // Senders only send while holding the map lock, so an
                        // empty queue checked under it stays empty.
                        let mut queues = queues.lock().await;
                        if receiver.is_empty() {
                            queues.remove(&participant_id);
                            break;
                        }
                    }
                }
            }
            tracing::trace!(user_id = %mask_participant(&participant_id), "Dispatch worker exited");
        });
    }
}
