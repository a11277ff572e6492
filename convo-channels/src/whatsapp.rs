//! WhatsApp channel.
//!
//! Uses the WhatsApp Business Cloud API. Inbound messages arrive by webhook
//! (push-based); replies are sent with the Graph API messages endpoint.

use crate::message::{ChannelMessage, ChannelType, MessageContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use convo_common::config::WhatsAppConfig;
use convo_common::logging::generate_trace_id;
use convo_common::util::mask_participant;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// WhatsApp channel using the Business Cloud API.
pub struct WhatsAppChannel {
    access_token: String,
    phone_number_id: String,
    verify_token: String,
    allowed_numbers: Vec<String>,
    api_base: String,
    client: Client,
}

impl WhatsAppChannel {
    pub fn new(
        access_token: String,
        phone_number_id: String,
        verify_token: String,
        allowed_numbers: Vec<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            access_token,
            phone_number_id,
            verify_token,
            allowed_numbers,
            api_base: "https://graph.facebook.com/v18.0".into(),
            client,
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self::new(
            config.access_token.clone(),
            config.phone_number_id.clone(),
            config.verify_token.clone().unwrap_or_default(),
            config.allowed_numbers.clone(),
        )
        .with_api_base(config.api_base.clone())
    }

    /// Override the Graph API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Check if a phone number is allowed (E.164 format: +1234567890).
    pub fn is_number_allowed(&self, phone: &str) -> bool {
        self.allowed_numbers.iter().any(|n| n == "*" || n == phone)
    }

    pub fn verify_token(&self) -> &str {
        &self.verify_token
    }

    /// Extract inbound messages from a webhook payload.
    ///
    /// Status updates and messages from numbers outside the allow-list are
    /// skipped. Non-text messages are kept as [`MessageContent::Unsupported`]
    /// so the participant can be told to reply in text.
    pub fn parse_webhook_payload(&self, payload: &Value) -> Vec<ChannelMessage> {
        let mut messages = Vec::new();

        let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
            return messages;
        };

        for entry in entries {
            let Some(changes) = entry.get("changes").and_then(|c| c.as_array()) else {
                continue;
            };

            for change in changes {
                let Some(msgs) = change
                    .get("value")
                    .and_then(|v| v.get("messages"))
                    .and_then(|m| m.as_array())
                else {
                    continue;
                };

                for msg in msgs {
                    if let Some(message) = self.parse_message(msg) {
                        messages.push(message);
                    }
                }
            }
        }

        messages
    }

    fn parse_message(&self, msg: &Value) -> Option<ChannelMessage> {
        let from = msg.get("from").and_then(|f| f.as_str())?;
        let from = if from.starts_with('+') {
            from.to_string()
        } else {
            format!("+{from}")
        };

        if !self.is_number_allowed(&from) {
            tracing::warn!(user_id = %mask_participant(&from), "WhatsApp: ignoring message from unauthorized number");
            return None;
        }

        let content = match msg.get("text").and_then(|t| t.get("body")).and_then(|b| b.as_str()) {
            Some("") => return None,
            Some(body) => MessageContent::Text { text: body.to_string() },
            None => MessageContent::Unsupported {
                kind: msg
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            },
        };

        let timestamp = msg
            .get("timestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse::<i64>().ok())
            .map(|ts| ts * 1000)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let id = msg
            .get("id")
            .and_then(|i| i.as_str())
            .unwrap_or("unknown")
            .to_string();

        Some(ChannelMessage {
            id,
            channel_type: ChannelType::WhatsApp,
            user_id: from,
            content,
            metadata: HashMap::new(),
            timestamp,
            trace_id: generate_trace_id(),
        })
    }

    /// Send a text message. Returns the WhatsApp message ID.
    pub async fn send_text(&self, recipient: &str, text: &str) -> ChannelResult<String> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        // The API expects the number without the leading '+'.
        let to = recipient.strip_prefix('+').unwrap_or(recipient);

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("WhatsApp send error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "WhatsApp API error ({status}): {error}"
            )));
        }

        let result: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Internal(format!("Failed to parse response: {e}")))?;

        let message_id = result
            .get("messages")
            .and_then(|m| m.as_array())
            .and_then(|arr| arr.first())
            .and_then(|msg| msg.get("id"))
            .and_then(|id| id.as_str())
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!(user_id = %mask_participant(recipient), %message_id, "WhatsApp message sent");
        Ok(message_id)
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, message: &OutgoingMessage) -> ChannelResult<String> {
        self.send_text(&message.user_id, &message.text).await
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let url = format!("{}/{}", self.api_base, self.phone_number_id);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("Health check failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::Auth("WhatsApp authentication failed".into()))
        }
    }
}
