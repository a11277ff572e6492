//! Inbound message processor.
//!
//! Feeds messages from the webhook routes into the per-participant dispatch
//! queues and sends each reply back through the [`OutboundRouter`].

use crate::message::{ChannelMessage, OutgoingMessage};
use crate::outbound::OutboundRouter;
use convo_common::util::mask_participant;
use convo_core::DispatchQueues;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Reply to images, voice notes and other non-text messages.
pub const TEXT_ONLY_NOTICE: &str =
    "Sorry, I can only read text messages. Please reply with text.";

/// Spawn the loop that drains inbound messages.
///
/// Messages are submitted in arrival order so each participant's queue sees
/// them in that order; replies are awaited on separate tasks.
pub fn spawn_processor(
    queues: Arc<DispatchQueues>,
    outbound: Arc<OutboundRouter>,
    mut rx: mpsc::Receiver<ChannelMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Message processor started");

        while let Some(message) = rx.recv().await {
            outbound.remember(&message);

            let Some(text) = message.text_content() else {
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    deliver(&outbound, &message, TEXT_ONLY_NOTICE.to_string()).await;
                });
                continue;
            };

            let pending = queues.submit(&message.user_id, text).await;
            let outbound = outbound.clone();
            tokio::spawn(async move {
                match pending.await {
                    Ok(reply) => deliver(&outbound, &message, reply.message).await,
                    Err(_) => tracing::error!(
                        user_id = %mask_participant(&message.user_id),
                        trace_id = %message.trace_id,
                        "Dispatch dropped without a reply"
                    ),
                }
            });
        }

        tracing::info!("Message processor stopped");
    })
}

async fn deliver(outbound: &OutboundRouter, original: &ChannelMessage, text: String) {
    if text.is_empty() {
        return;
    }

    let outgoing = OutgoingMessage {
        channel_type: original.channel_type,
        user_id: original.user_id.clone(),
        text,
    };

    let result = outbound.send(&outgoing).await;
    if result.success {
        tracing::debug!(
            user_id = %mask_participant(&original.user_id),
            trace_id = %original.trace_id,
            "Reply sent"
        );
    }
}
