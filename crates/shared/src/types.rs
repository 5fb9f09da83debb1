//! Common types used across the livechat backend

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Who authored a message.
///
/// Stored in Postgres as the `sender_type` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "sender_type", rename_all = "lowercase")]
pub enum SenderType {
    Visitor,
    Operator,
    Bot,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Visitor => "visitor",
            SenderType::Operator => "operator",
            SenderType::Bot => "bot",
        }
    }
}

/// A visitor's chat session.
///
/// `visitor_id` is an opaque key generated by the widget client; it is the
/// routing key for live connections and is distinct from the database `id`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub visitor_id: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub content: String,
    pub sender_type: SenderType,
    pub image_url: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
