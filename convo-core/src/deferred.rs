//! Out-of-band execution of slow handler work.
//!
//! A handler that needs a catalog fetch, payment call or enrollment returns a
//! [`DeferredJob`]. The participant immediately gets the interim reply with the
//! session parked in `processing`; the job runs on the worker after a short
//! delay and its result is saved into the session and delivered through the
//! [`Notifier`].
//!
//! Every participant has at most one live job. Scheduling a new one, or
//! calling [`DeferredTaskRunner::cancel`], cancels the previous job and its
//! completion is discarded.

use crate::notify::Notifier;
use crate::router::{DeferredJob, JobFuture, Reply, Transition};
use crate::session::{SessionLocks, SessionStore};
use crate::state::StateTag;
use convo_common::config::DeferredConfig;
use convo_common::util::mask_participant;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sent when a deferred job fails.
pub const FAILURE_NOTICE: &str =
    "Sorry, something went wrong while processing your request. Say hi to start again.";

/// Interim text used when a handler does not supply its own.
pub const PROCESSING_NOTICE: &str = "Please wait a moment while we process your request...";

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Deferred queue is full")]
    QueueFull,

    #[error("Deferred runner is shut down")]
    Closed,
}

struct QueuedJob {
    participant_id: String,
    job_id: Uuid,
    token: CancellationToken,
    task: JobFuture,
}

struct Slot {
    job_id: Uuid,
    token: CancellationToken,
}

/// Shared between the runner handle, the worker and the job tasks.
struct Shared {
    store: SessionStore,
    locks: Arc<SessionLocks>,
    notifier: Arc<dyn Notifier>,
    slots: DashMap<String, Slot>,
    delay: Duration,
}

/// Bounded job queue, one worker, and a cancellable slot per participant.
pub struct DeferredTaskRunner {
    tx: mpsc::Sender<QueuedJob>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredTaskRunner {
    /// Spawn the worker. Must be called inside a Tokio runtime.
    pub fn start(
        store: SessionStore,
        locks: Arc<SessionLocks>,
        notifier: Arc<dyn Notifier>,
        config: &DeferredConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            store,
            locks,
            notifier,
            slots: DashMap::new(),
            delay: Duration::from_millis(config.delay_ms),
        });
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(worker_loop(rx, shared.clone(), shutdown.clone()));
        tracing::info!(
            delay_ms = config.delay_ms,
            queue_capacity = config.queue_capacity,
            "Deferred task runner started"
        );

        Self {
            tx,
            shared,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Park the session in `processing` and hand the job to the worker.
    ///
    /// Returns the interim reply. If the job cannot be queued the session is
    /// reset and the failure notice is returned instead. The caller must hold
    /// the participant's session lock.
    pub async fn run_deferred(&self, participant_id: &str, job: DeferredJob) -> Reply {
        let DeferredJob { interim, data, task } = job;
        self.shared
            .store
            .save(participant_id, Some(StateTag::Processing), data)
            .await;

        match self.schedule(participant_id, task) {
            Ok(_) => Reply::new(interim, StateTag::Processing),
            Err(e) => {
                tracing::warn!(
                    user_id = %mask_participant(participant_id),
                    error = %e,
                    "Could not schedule deferred job"
                );
                self.shared.store.delete(participant_id).await;
                Reply::new(FAILURE_NOTICE, StateTag::Home)
            }
        }
    }

    /// Queue a job, superseding any live job for the same participant.
    pub fn schedule(&self, participant_id: &str, task: JobFuture) -> Result<Uuid, ScheduleError> {
        if self.shutdown.is_cancelled() {
            return Err(ScheduleError::Closed);
        }

        let job_id = Uuid::new_v4();
        let token = self.shutdown.child_token();
        let previous = self.shared.slots.insert(
            participant_id.to_string(),
            Slot {
                job_id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(
                user_id = %mask_participant(participant_id),
                superseded = %previous.job_id,
                "Superseding in-flight deferred job"
            );
            previous.token.cancel();
        }

        let queued = QueuedJob {
            participant_id: participant_id.to_string(),
            job_id,
            token,
            task,
        };

        match self.tx.try_send(queued) {
            Ok(()) => {
                tracing::debug!(user_id = %mask_participant(participant_id), %job_id, "Deferred job queued");
                Ok(job_id)
            }
            Err(e) => {
                self.shared
                    .slots
                    .remove_if(participant_id, |_, slot| slot.job_id == job_id);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => ScheduleError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => ScheduleError::Closed,
                })
            }
        }
    }

    /// Cancel the participant's live job, if any. Returns true if one existed.
    pub fn cancel(&self, participant_id: &str) -> bool {
        match self.shared.slots.remove(participant_id) {
            Some((_, slot)) => {
                slot.token.cancel();
                tracing::debug!(
                    user_id = %mask_participant(participant_id),
                    job_id = %slot.job_id,
                    "Deferred job cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Whether the participant has a job that has not completed yet.
    pub fn is_pending(&self, participant_id: &str) -> bool {
        self.shared.slots.contains_key(participant_id)
    }

    /// Number of live jobs across all participants.
    pub fn in_flight(&self) -> usize {
        self.shared.slots.len()
    }

    /// Stop the worker and cancel every live job.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.shared.slots.clear();

        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Deferred worker ended abnormally");
            }
        }
        tracing::info!("Deferred task runner stopped");
    }
}

impl Drop for DeferredTaskRunner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<QueuedJob>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        tokio::spawn(run_job(shared.clone(), job));
    }
    tracing::debug!("Deferred worker exiting");
}

async fn run_job(shared: Arc<Shared>, job: QueuedJob) {
    let QueuedJob {
        participant_id,
        job_id,
        token,
        task,
    } = job;
    let user = mask_participant(&participant_id);

    let result = tokio::select! {
        _ = token.cancelled() => None,
        result = async {
            tokio::time::sleep(shared.delay).await;
            task.await
        } => Some(result),
    };
    let Some(result) = result else {
        tracing::debug!(user_id = %user, %job_id, "Deferred job discarded after cancellation");
        return;
    };

    let message = {
        let _guard = shared.locks.lock(&participant_id).await;

        // Checked under the session lock: a dispatch that resets the session
        // cancels the token while holding the same lock.
        if token.is_cancelled()
            || shared
                .slots
                .remove_if(&participant_id, |_, slot| slot.job_id == job_id)
                .is_none()
        {
            tracing::debug!(user_id = %user, %job_id, "Stale deferred completion discarded");
            return;
        }

        match result {
            Ok(transition) => {
                tracing::info!(user_id = %user, %job_id, state = %transition.state, "Deferred job completed");
                apply(&shared.store, &participant_id, transition).await
            }
            Err(e) => {
                tracing::warn!(user_id = %user, %job_id, error = %e, "Deferred job failed");
                shared.store.delete(&participant_id).await;
                FAILURE_NOTICE.to_string()
            }
        }
    };

    if let Err(e) = shared.notifier.send(&participant_id, &message).await {
        tracing::warn!(user_id = %user, %job_id, error = %e, "Failed to deliver deferred result");
    }
}

async fn apply(store: &SessionStore, participant_id: &str, transition: Transition) -> String {
    let Transition {
        message,
        state,
        data,
    } = transition;
    if state.is_terminal() {
        store.delete(participant_id).await;
    } else {
        store.save(participant_id, Some(state), data).await;
    }
    message
}
