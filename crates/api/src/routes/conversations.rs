//! Conversation history and read-receipt endpoints

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use livechat_shared::{ChatError, Conversation, Message, SenderType};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::{ChatStore, PgStore};
use crate::websocket::{events::OutboundEvent, relay::Relay};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub visitor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub sender_type: SenderType,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub status: &'static str,
    pub updated_count: u64,
}

#[derive(Debug, Serialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Find the visitor's active conversation or create a fresh one.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<Json<ConversationWithMessages>> {
    let store = PgStore::new(state.pool.clone());

    if let Some(conversation) = store.find_active_conversation(&req.visitor_id).await? {
        let messages = store.messages_for_conversations(&[conversation.id]).await?;
        return Ok(Json(ConversationWithMessages {
            conversation,
            messages,
        }));
    }

    let conversation = store.create_conversation(&req.visitor_id).await?;
    Ok(Json(ConversationWithMessages {
        conversation,
        messages: Vec::new(),
    }))
}

/// All conversations with their messages, newest conversation first.
pub async fn list_conversations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ConversationWithMessages>>> {
    let store = PgStore::new(state.pool.clone());

    let conversations = store.list_conversations().await?;
    let ids: Vec<i64> = conversations.iter().map(|c| c.id).collect();

    // Single batched message query instead of one per conversation
    let mut by_conversation: HashMap<i64, Vec<Message>> = HashMap::new();
    for message in store.messages_for_conversations(&ids).await? {
        by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message);
    }

    let response = conversations
        .into_iter()
        .map(|conversation| {
            let messages = by_conversation.remove(&conversation.id).unwrap_or_default();
            ConversationWithMessages {
                conversation,
                messages,
            }
        })
        .collect();

    Ok(Json(response))
}

/// History for one visitor key.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(visitor_id): Path<String>,
) -> ApiResult<Json<ConversationWithMessages>> {
    let store = PgStore::new(state.pool.clone());

    let conversation = store
        .find_latest_conversation(&visitor_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let messages = store.messages_for_conversations(&[conversation.id]).await?;

    Ok(Json(ConversationWithMessages {
        conversation,
        messages,
    }))
}

/// Mark the opposite side's messages as read and notify live connections.
pub async fn mark_messages_read(
    State(state): State<AppState>,
    Path(visitor_id): Path<String>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<Json<MarkReadResponse>> {
    let store = PgStore::new(state.pool.clone());
    let relay = Relay::new(Arc::clone(&state.registry));

    let updated = apply_read_receipt(&store, &relay, &visitor_id, req.sender_type).await?;

    Ok(Json(MarkReadResponse {
        status: "ok",
        updated_count: updated,
    }))
}

// =============================================================================
// Read-receipt fan-out
// =============================================================================

/// Bulk-mark the requester's counterpart messages as read; broadcast exactly
/// one `messages_read` event, and only when at least one row changed.
pub(crate) async fn apply_read_receipt<S: ChatStore>(
    store: &S,
    relay: &Relay,
    visitor_id: &str,
    reader: SenderType,
) -> Result<u64, ChatError> {
    let conversation = store
        .find_active_conversation(visitor_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("conversation for visitor {visitor_id}")))?;

    // The reader marks the other side's messages as read
    let targets: &[SenderType] = match reader {
        SenderType::Visitor => &[SenderType::Operator, SenderType::Bot],
        SenderType::Operator => &[SenderType::Visitor],
        SenderType::Bot => &[],
    };

    let updated = store.mark_read(conversation.id, targets, true).await?;
    tracing::debug!(
        visitor_id = %visitor_id,
        reader = reader.as_str(),
        updated = updated,
        "Applied read receipt"
    );

    if updated > 0 {
        relay
            .broadcast(
                visitor_id,
                &OutboundEvent::messages_read(conversation.id, visitor_id, reader),
            )
            .await;
    }

    Ok(updated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::testing::MemoryStore;
    use crate::websocket::{connection::Connection, registry::ConnectionRegistry};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    async fn relay_with_operator() -> (Relay, UnboundedReceiver<OutboundEvent>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .register_operator(Arc::new(Connection::new(tx)))
            .await;
        (relay, rx)
    }

    #[tokio::test]
    async fn test_visitor_read_receipt_marks_operator_and_bot_messages() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("v-1").await.unwrap();
        store.seed_message(conversation.id, SenderType::Operator, "a", false);
        store.seed_message(conversation.id, SenderType::Operator, "b", false);
        store.seed_message(conversation.id, SenderType::Operator, "c", false);
        store.seed_message(conversation.id, SenderType::Bot, "greeting", false);
        store.seed_message(conversation.id, SenderType::Visitor, "mine", false);
        let (relay, mut rx) = relay_with_operator().await;

        let updated = apply_read_receipt(&store, &relay, "v-1", SenderType::Visitor)
            .await
            .unwrap();

        assert_eq!(updated, 4);
        let event = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["type"], "messages_read");
        assert_eq!(event["reader_type"], "visitor");
        assert!(rx.try_recv().is_err(), "exactly one event expected");

        // The visitor's own message stays unread
        let own = store
            .messages()
            .into_iter()
            .find(|m| m.sender_type == SenderType::Visitor)
            .unwrap();
        assert!(!own.is_read);
    }

    #[tokio::test]
    async fn test_noop_read_receipt_emits_no_event() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("v-1").await.unwrap();
        store.seed_message(conversation.id, SenderType::Operator, "a", true);
        let (relay, mut rx) = relay_with_operator().await;

        let updated = apply_read_receipt(&store, &relay, "v-1", SenderType::Visitor)
            .await
            .unwrap();

        assert_eq!(updated, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_operator_read_receipt_targets_visitor_messages() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("v-1").await.unwrap();
        store.seed_message(conversation.id, SenderType::Visitor, "hi", false);
        store.seed_message(conversation.id, SenderType::Bot, "greeting", false);
        let (relay, mut rx) = relay_with_operator().await;

        let updated = apply_read_receipt(&store, &relay, "v-1", SenderType::Operator)
            .await
            .unwrap();

        assert_eq!(updated, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_visitor_key_is_not_found() {
        let store = MemoryStore::new();
        let (relay, _rx) = relay_with_operator().await;

        let result = apply_read_receipt(&store, &relay, "nobody", SenderType::Visitor).await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
    }
}
