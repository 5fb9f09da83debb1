//! Relay event types and inbound frame payloads
//!
//! Outbound events are immutable once constructed and delivered verbatim to
//! every relay target, except for the conversation-key injection applied to
//! operator-bound copies (see [`super::relay`]).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use livechat_shared::{Message, SenderType};

// =============================================================================
// Outbound Events
// =============================================================================

/// Reference to a conversation carried by an outbound event: either the
/// numeric persistence id, or the opaque visitor key injected by the relay
/// for the operator's multiplexed view.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConversationRef {
    Id(i64),
    Key(String),
}

/// A persisted message as delivered to live connections.
#[derive(Debug, Clone, Serialize)]
pub struct MessageEvent {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationRef>,
    pub visitor_id: String,
    pub content: String,
    pub sender_type: SenderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Read-receipt notification, emitted once per successful bulk update.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesReadEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub conversation_id: i64,
    pub visitor_id: String,
    pub reader_type: SenderType,
    #[serde(with = "time::serde::rfc3339")]
    pub read_at: OffsetDateTime,
}

/// Events sent from server to connected clients
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Message(MessageEvent),
    MessagesRead(MessagesReadEvent),
}

impl OutboundEvent {
    /// Build a message event from a persisted row.
    pub fn message(message: &Message, visitor_id: &str) -> Self {
        Self::Message(MessageEvent {
            id: message.id,
            conversation_id: Some(ConversationRef::Id(message.conversation_id)),
            visitor_id: visitor_id.to_string(),
            content: message.content.clone(),
            sender_type: message.sender_type,
            image_url: message.image_url.clone(),
            is_read: message.is_read,
            created_at: message.created_at,
        })
    }

    /// Build a read-receipt event stamped with the current time.
    pub fn messages_read(conversation_id: i64, visitor_id: &str, reader: SenderType) -> Self {
        Self::MessagesRead(MessagesReadEvent {
            event_type: "messages_read",
            conversation_id,
            visitor_id: visitor_id.to_string(),
            reader_type: reader,
            read_at: OffsetDateTime::now_utc(),
        })
    }

    /// Whether this event already carries a conversation reference.
    pub fn has_conversation_key(&self) -> bool {
        match self {
            OutboundEvent::Message(event) => event.conversation_id.is_some(),
            OutboundEvent::MessagesRead(_) => true,
        }
    }

    /// Copy of this event with the routing key injected as its conversation
    /// reference. Only meaningful for events that lack one.
    pub fn with_conversation_key(&self, key: &str) -> Self {
        match self {
            OutboundEvent::Message(event) => OutboundEvent::Message(MessageEvent {
                conversation_id: Some(ConversationRef::Key(key.to_string())),
                ..event.clone()
            }),
            OutboundEvent::MessagesRead(event) => OutboundEvent::MessagesRead(event.clone()),
        }
    }
}

// =============================================================================
// Inbound Payloads
// =============================================================================

/// A visitor's inbound frame, decided at parse time: structured JSON, or the
/// raw text fallback when the frame is not a well-formed payload object.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitorPayload {
    Structured {
        content: String,
        image_url: Option<String>,
    },
    RawText(String),
}

impl VisitorPayload {
    /// Parse a text frame. Malformed JSON is not an error; the whole frame
    /// becomes plain-text content.
    pub fn parse(frame: &str) -> Self {
        #[derive(Deserialize)]
        struct Structured {
            #[serde(default)]
            content: String,
            #[serde(default)]
            image_url: Option<String>,
        }

        match serde_json::from_str::<Structured>(frame) {
            Ok(payload) => VisitorPayload::Structured {
                content: payload.content,
                image_url: payload.image_url,
            },
            Err(_) => VisitorPayload::RawText(frame.to_string()),
        }
    }

    pub fn into_parts(self) -> (String, Option<String>) {
        match self {
            VisitorPayload::Structured { content, image_url } => (content, image_url),
            VisitorPayload::RawText(text) => (text, None),
        }
    }
}

/// A validated operator frame targeting one visitor's conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorFrame {
    pub visitor_id: String,
    pub content: String,
    pub image_url: Option<String>,
}

impl OperatorFrame {
    /// Parse and validate an operator frame. Returns `None` when the frame is
    /// malformed, lacks a target visitor key, or carries neither content nor
    /// an image; such frames are dropped by the session.
    pub fn parse(frame: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Raw {
            visitor_id: Option<String>,
            content: Option<String>,
            image_url: Option<String>,
        }

        let raw = serde_json::from_str::<Raw>(frame).ok()?;
        let visitor_id = raw.visitor_id.filter(|id| !id.is_empty())?;
        let content = raw.content.unwrap_or_default();
        if content.is_empty() && raw.image_url.is_none() {
            return None;
        }

        Some(OperatorFrame {
            visitor_id,
            content,
            image_url: raw.image_url,
        })
    }
}
