use serde::{Deserialize, Serialize};

use crate::error::WebSocketError;

/// Chat line as sent by a client. The hub never inspects it; missing
/// fields stay missing on the way out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>, author: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            author: Some(author.into()),
            avatar_url: Some(avatar_url.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl TypingNotice {
    pub fn new(author: impl Into<String>) -> Self {
        Self { author: Some(author.into()) }
    }
}

/// Inbound events, connection -> hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "register")]
    Register(String),
    #[serde(rename = "send-message")]
    SendMessage(ChatMessage),
    #[serde(rename = "typing")]
    Typing(TypingNotice),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, WebSocketError> {
        serde_json::from_str(text).map_err(|e| WebSocketError::InvalidFormat(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Register(_) => "register",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::Typing(_) => "typing",
        }
    }
}

/// Outbound events, hub -> connection(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "roster-updated")]
    RosterUpdated(Vec<String>),
    #[serde(rename = "participant-joined")]
    ParticipantJoined,
    #[serde(rename = "participant-left")]
    ParticipantLeft,
    #[serde(rename = "message-received")]
    MessageReceived(ChatMessage),
    #[serde(rename = "typing-notice")]
    TypingNotice(TypingNotice),
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, WebSocketError> {
        serde_json::to_string(self).map_err(|e| WebSocketError::InvalidFormat(e.to_string()))
    }
}
