//! Channel traits for implementing channel adapters.

use crate::message::OutgoingMessage;
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outbound side of a messaging channel.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver a message. Returns the channel's message ID.
    async fn send(&self, message: &OutgoingMessage) -> ChannelResult<String>;

    async fn health_check(&self) -> ChannelResult<()>;
}

/// Channel that writes replies to the log; used for generic webhooks and
/// local testing.
pub struct LogChannel;

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn send(&self, message: &OutgoingMessage) -> ChannelResult<String> {
        tracing::info!(
            user_id = %convo_common::util::mask_participant(&message.user_id),
            text = %message.text,
            "Reply"
        );
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }
}
