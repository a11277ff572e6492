//! Handler results.

use crate::session::SessionData;
use crate::state::StateTag;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// What the participant sees after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: String,
    pub state: StateTag,
}

impl Reply {
    pub fn new(message: impl Into<String>, state: StateTag) -> Self {
        Self {
            message: message.into(),
            state,
        }
    }
}

/// A synchronous handler result: reply text, next state and a data patch.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub message: String,
    pub state: StateTag,
    pub data: SessionData,
}

impl Transition {
    pub fn to(state: StateTag, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            state,
            data: SessionData::new(),
        }
    }

    /// Move to `state` and show its canonical prompt.
    pub fn prompt(state: StateTag) -> Self {
        Self::to(state, state.prompt())
    }

    /// Stay in `state` with a corrective message followed by the prompt.
    pub fn retry(state: StateTag, problem: &str) -> Self {
        Self::to(state, format!("{problem}\n\n{}", state.prompt()))
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_data(mut self, data: SessionData) -> Self {
        self.data.extend(data);
        self
    }
}

/// Slow work that completes after the interim reply has been sent.
pub type JobFuture = BoxFuture<'static, anyhow::Result<Transition>>;

/// A handler's request to run slow work out-of-band.
pub struct DeferredJob {
    /// Reply sent immediately while the job runs.
    pub interim: String,
    /// Merged into the session together with the processing state.
    pub data: SessionData,
    pub task: JobFuture,
}

impl DeferredJob {
    pub fn new(interim: impl Into<String>, task: JobFuture) -> Self {
        Self {
            interim: interim.into(),
            data: SessionData::new(),
            task,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Result of handling one input in one state.
pub enum Outcome {
    Reply(Transition),
    Deferred(DeferredJob),
    /// Destroy the session and reply from the home state.
    Reset(String),
}

impl From<Transition> for Outcome {
    fn from(t: Transition) -> Self {
        Outcome::Reply(t)
    }
}

impl From<DeferredJob> for Outcome {
    fn from(job: DeferredJob) -> Self {
        Outcome::Deferred(job)
    }
}
