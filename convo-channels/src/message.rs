//! Message types for channel communication.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    WhatsApp,
    /// Local testing and generic webhooks; replies are logged.
    Cli,
}

impl ChannelType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Cli => "cli",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "whatsapp" => Self::WhatsApp,
            _ => Self::Cli,
        }
    }
}

/// Inbound message, normalized across channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    pub channel_type: ChannelType,
    /// Participant identifier; also the session key.
    pub user_id: String,
    pub content: MessageContent,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID for log correlation
    pub trace_id: String,
}

/// Message content types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    /// Anything the conversation cannot read (image, audio, location, ...).
    Unsupported { kind: String },
}

impl ChannelMessage {
    pub fn text(user_id: impl Into<String>, channel_type: ChannelType, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type,
            user_id: user_id.into(),
            content: MessageContent::Text { text: text.into() },
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            trace_id: convo_common::logging::generate_trace_id(),
        }
    }

    /// Text content, if this is a text message.
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Unsupported { .. } => None,
        }
    }
}

/// Outgoing text for one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel_type: ChannelType,
    pub user_id: String,
    pub text: String,
}
