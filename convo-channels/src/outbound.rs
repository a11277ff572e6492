//! Outbound message routing.
//!
//! Replies to inbound messages and out-of-band notices (deferred results,
//! timeout notices) both leave through the [`OutboundRouter`]. The router
//! remembers the channel each participant last wrote from; notifications
//! raised by background work go to that channel. Routes not refreshed within
//! a session lifetime are dropped by the engine's sweep.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, LogChannel};
use crate::whatsapp::WhatsAppChannel;
use async_trait::async_trait;
use convo_common::util::mask_participant;
use convo_core::{now_ms, Notifier, NotifyError};
use dashmap::DashMap;
use std::sync::Arc;

// ============================================================================
// OutboundRouter
// ============================================================================

/// Routes outgoing messages to the appropriate channel.
pub struct OutboundRouter {
    /// WhatsApp channel instance
    whatsapp: Option<Arc<WhatsAppChannel>>,
    /// Replies for the CLI channel and generic webhooks
    log: LogChannel,
    /// Last inbound channel per participant
    routes: DashMap<String, Route>,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    channel_type: ChannelType,
    /// Epoch ms of the last inbound message.
    seen_at: i64,
}

/// Result of a send operation.
#[derive(Debug)]
pub struct SendResult {
    pub success: bool,
    /// Message ID returned by the channel (if any)
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

impl Default for OutboundRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundRouter {
    pub fn new() -> Self {
        Self {
            whatsapp: None,
            log: LogChannel,
            routes: DashMap::new(),
        }
    }

    /// Set the WhatsApp channel instance.
    pub fn with_whatsapp(mut self, channel: Arc<WhatsAppChannel>) -> Self {
        self.whatsapp = Some(channel);
        self
    }

    /// Record the channel a participant wrote from.
    pub fn remember(&self, message: &ChannelMessage) {
        self.remember_at(message, now_ms());
    }

    fn remember_at(&self, message: &ChannelMessage, seen_at: i64) {
        self.routes.insert(
            message.user_id.clone(),
            Route {
                channel_type: message.channel_type,
                seen_at,
            },
        );
    }

    /// Channel last used by a participant.
    pub fn route_for(&self, participant_id: &str) -> Option<ChannelType> {
        self.routes.get(participant_id).map(|r| r.channel_type)
    }

    /// Number of remembered participants.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Send a message to its channel.
    pub async fn send(&self, message: &OutgoingMessage) -> SendResult {
        let result = match message.channel_type {
            ChannelType::WhatsApp => match self.whatsapp {
                Some(ref whatsapp) => whatsapp.send(message).await,
                None => return SendResult::failed("WhatsApp channel not configured"),
            },
            ChannelType::Cli => self.log.send(message).await,
        };

        match result {
            Ok(msg_id) => SendResult {
                success: true,
                message_id: Some(msg_id),
                error: None,
            },
            Err(e) => {
                tracing::error!(
                    channel = message.channel_type.as_str(),
                    user_id = %mask_participant(&message.user_id),
                    error = %e,
                    "Failed to send message"
                );
                SendResult::failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Notifier for OutboundRouter {
    async fn send(&self, participant_id: &str, text: &str) -> Result<(), NotifyError> {
        let Some(channel_type) = self.route_for(participant_id) else {
            return Err(NotifyError::Unroutable(mask_participant(participant_id)));
        };

        let outgoing = OutgoingMessage {
            channel_type,
            user_id: participant_id.to_string(),
            text: text.to_string(),
        };

        let result = OutboundRouter::send(self, &outgoing).await;
        if result.success {
            Ok(())
        } else {
            Err(NotifyError::Delivery(result.error.unwrap_or_default()))
        }
    }

    fn forget_idle(&self, now: i64, idle_ms: u64) -> usize {
        let idle = i64::try_from(idle_ms).unwrap_or(i64::MAX);
        let before = self.routes.len();
        self.routes
            .retain(|_, route| now.saturating_sub(route.seen_at) <= idle);
        before.saturating_sub(self.routes.len())
    }
}
