//! Wires the session engine together from configuration.

use crate::deferred::DeferredTaskRunner;
use crate::notify::Notifier;
use crate::providers::Providers;
use crate::queue::DispatchQueues;
use crate::router::StateRouter;
use crate::session::{SessionLocks, SessionStore};
use crate::store::build_store;
use crate::timeout::TimeoutMonitor;
use convo_common::config::{Config, DeferredConfig, SessionConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running engine: router, per-participant queues, deferred worker and
/// fallback sweeper. Must be built inside a Tokio runtime.
pub struct Engine {
    pub store: SessionStore,
    pub router: Arc<StateRouter>,
    pub queues: Arc<DispatchQueues>,
    pub deferred: Arc<DeferredTaskRunner>,
    pub timeout: Arc<TimeoutMonitor>,
    cancel: CancellationToken,
    sweeper: JoinHandle<()>,
}

impl Engine {
    /// Connect the configured store and start every background task.
    pub async fn from_config(
        config: &Config,
        notifier: Arc<dyn Notifier>,
        providers: Providers,
    ) -> Self {
        let kv = Arc::new(build_store(&config.store).await);
        let store = SessionStore::new(kv, &config.session);
        Self::with_store(store, &config.session, &config.deferred, notifier, providers)
    }

    pub fn with_store(
        store: SessionStore,
        session: &SessionConfig,
        deferred: &DeferredConfig,
        notifier: Arc<dyn Notifier>,
        providers: Providers,
    ) -> Self {
        let locks = Arc::new(SessionLocks::new());
        let timeout = Arc::new(
            TimeoutMonitor::new(store.clone(), session.timeout_ms)
                .with_locks(locks.clone())
                .with_notifier(notifier.clone()),
        );
        let deferred = Arc::new(DeferredTaskRunner::start(
            store.clone(),
            locks.clone(),
            notifier,
            deferred,
        ));
        let router = Arc::new(StateRouter::new(
            store.clone(),
            locks,
            timeout.clone(),
            deferred.clone(),
            providers,
        ));
        let queues = Arc::new(DispatchQueues::new(router.clone()));

        let cancel = CancellationToken::new();
        let sweeper = timeout.clone().spawn_sweeper(
            Duration::from_secs(session.sweep_interval_secs.max(1)),
            cancel.child_token(),
        );

        tracing::info!(
            ttl_secs = session.ttl_secs,
            timeout_ms = session.timeout_ms,
            "Session engine started"
        );

        Self {
            store,
            router,
            queues,
            deferred,
            timeout,
            cancel,
            sweeper,
        }
    }

    /// Stop the sweeper and the deferred worker.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.sweeper.await {
            tracing::warn!(error = %e, "Session sweeper ended abnormally");
        }
        self.deferred.shutdown().await;
    }
}
