//! Convo Core - Session and routing engine for conversational messaging flows.
//!
//! Every inbound message is mapped, through a per-participant session, to one
//! of a closed set of conversation states, handled by the handler registered
//! for that state, and answered with a reply plus the next state.
//!
//! ## Architecture
//!
//! ```text
//! inbound ─▶ DispatchQueues ─▶ StateRouter ─▶ StateHandler
//!                                  │   │            │
//!                                  │   │            └─▶ DeferredTaskRunner ─▶ Notifier
//!                                  │   └─▶ TimeoutMonitor
//!                                  ▼
//!                             SessionStore ─▶ TieredStore (primary + in-memory fallback)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use convo_core::Engine;
//!
//! let engine = Engine::from_config(&config, notifier, providers).await;
//! let reply = engine.queues.dispatch("254712345678", "hi").await?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod deferred;
pub mod engine;
pub mod notify;
pub mod providers;
pub mod queue;
pub mod router;
pub mod session;
pub mod state;
pub mod store;
pub mod timeout;

pub use deferred::{DeferredTaskRunner, ScheduleError, FAILURE_NOTICE};
pub use engine::Engine;
pub use notify::{MemoryNotifier, NotifyError, Notifier};
pub use providers::{CatalogProvider, EnrollmentProvider, PaymentProvider, Providers};
pub use queue::{DispatchQueues, QueueError};
pub use router::{DeferredJob, Outcome, Reply, StateHandler, StateRouter, Transition};
pub use session::{Session, SessionData, SessionLocks, SessionStore};
pub use state::{Product, StateTag, WELCOME};
pub use store::{KvStore, MemoryStore, StoreError, TieredStore};
pub use timeout::{TimeoutCheck, TimeoutMonitor, TIMEOUT_NOTICE};

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
