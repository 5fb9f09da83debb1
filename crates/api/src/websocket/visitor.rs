//! Visitor session
//!
//! One task per widget connection: receives inbound frames in arrival order,
//! persists them, fans them out through the relay, and triggers the one-shot
//! bot greeting.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use livechat_shared::{ChatError, SenderType};

use crate::state::AppState;
use crate::storage::{ChatStore, PgStore};

use super::{
    connection::Connection,
    events::{OutboundEvent, VisitorPayload},
    relay::Relay,
};

/// WebSocket handler for `/ws/visitor/:visitor_id`
pub async fn visitor_ws_handler(
    ws: WebSocketUpgrade,
    Path(visitor_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    tracing::info!(visitor_id = %visitor_id, "Visitor WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_visitor_socket(socket, visitor_id, state))
}

/// Handle one visitor connection from handshake to disconnect
async fn handle_visitor_socket(socket: WebSocket, visitor_id: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for events destined to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
    let conn = Arc::new(Connection::new(tx));
    let connection_id = conn.id;
    state
        .registry
        .register_visitor(&visitor_id, Arc::clone(&conn))
        .await;

    // Writer task: serialize and forward events to the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(WsMessage::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize outbound event");
                }
            }
        }
    });

    let store = PgStore::new(state.pool.clone());
    let relay = Relay::new(Arc::clone(&state.registry));

    while let Some(msg) = receiver.next().await {
        if let Ok(msg) = msg {
            match msg {
                WsMessage::Text(text) => {
                    // A storage failure drops this frame, not the connection
                    if let Err(e) = handle_visitor_frame(
                        &store,
                        &relay,
                        &visitor_id,
                        &text,
                        &state.config.bot_greeting,
                    )
                    .await
                    {
                        tracing::error!(
                            error = %e,
                            visitor_id = %visitor_id,
                            "Failed to process visitor frame"
                        );
                    }
                }
                WsMessage::Close(_) => {
                    tracing::info!(
                        visitor_id = %visitor_id,
                        connection_id = %connection_id,
                        "WebSocket close frame received"
                    );
                    break;
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => {
                    // Axum answers pings automatically
                }
                _ => {} // Ignore binary frames
            }
        }
    }

    tracing::info!(
        visitor_id = %visitor_id,
        connection_id = %connection_id,
        "Visitor connection closing"
    );
    state
        .registry
        .unregister_visitor(&visitor_id, &connection_id)
        .await;
    send_task.abort();
}

/// Process one inbound visitor frame: persist, fan out, and greet once.
///
/// The bot check-then-act is not transactional; two tabs racing on a fresh
/// conversation can both greet. The greeting is idempotent in effect, so the
/// duplicate is tolerated.
pub(crate) async fn handle_visitor_frame<S: ChatStore>(
    store: &S,
    relay: &Relay,
    visitor_id: &str,
    frame: &str,
    bot_greeting: &str,
) -> Result<(), ChatError> {
    let (content, image_url) = VisitorPayload::parse(frame).into_parts();

    let conversation = match store.find_active_conversation(visitor_id).await? {
        Some(conversation) => conversation,
        None => store.create_conversation(visitor_id).await?,
    };

    let message = store
        .append_message(
            conversation.id,
            SenderType::Visitor,
            &content,
            image_url.as_deref(),
        )
        .await?;
    relay
        .broadcast(visitor_id, &OutboundEvent::message(&message, visitor_id))
        .await;

    // One-shot greeting: only the first visitor message triggers the bot
    if store.find_bot_message(conversation.id).await?.is_none() {
        let bot_message = store
            .append_message(conversation.id, SenderType::Bot, bot_greeting, None)
            .await?;
        relay
            .broadcast(visitor_id, &OutboundEvent::message(&bot_message, visitor_id))
            .await;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::testing::MemoryStore;
    use crate::websocket::registry::ConnectionRegistry;
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    const GREETING: &str = "An agent will be with you shortly.";

    async fn relay_with_operator() -> (Relay, UnboundedReceiver<OutboundEvent>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .register_operator(Arc::new(Connection::new(tx)))
            .await;
        (relay, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundEvent>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(serde_json::to_value(event).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_first_message_triggers_bot_greeting() {
        let store = MemoryStore::new();
        let (relay, mut rx) = relay_with_operator().await;

        handle_visitor_frame(&store, &relay, "v-1", r#"{"content":"help!"}"#, GREETING)
            .await
            .unwrap();

        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender_type, SenderType::Visitor);
        assert_eq!(messages[0].content, "help!");
        assert_eq!(messages[1].sender_type, SenderType::Bot);
        assert_eq!(messages[1].content, GREETING);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["sender_type"], "visitor");
        assert_eq!(events[1]["sender_type"], "bot");
    }

    #[tokio::test]
    async fn test_second_message_does_not_repeat_greeting() {
        let store = MemoryStore::new();
        let (relay, mut rx) = relay_with_operator().await;

        handle_visitor_frame(&store, &relay, "v-1", r#"{"content":"first"}"#, GREETING)
            .await
            .unwrap();
        drain(&mut rx);

        handle_visitor_frame(&store, &relay, "v-1", r#"{"content":"second"}"#, GREETING)
            .await
            .unwrap();

        assert_eq!(store.message_count(), 3);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["sender_type"], "visitor");
        assert_eq!(events[0]["content"], "second");
    }

    #[tokio::test]
    async fn test_conversation_created_once_per_key() {
        let store = MemoryStore::new();
        let (relay, _rx) = relay_with_operator().await;

        handle_visitor_frame(&store, &relay, "v-1", "one", GREETING)
            .await
            .unwrap();
        handle_visitor_frame(&store, &relay, "v-1", "two", GREETING)
            .await
            .unwrap();

        assert_eq!(store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_becomes_plain_text() {
        let store = MemoryStore::new();
        let (relay, _rx) = relay_with_operator().await;

        handle_visitor_frame(&store, &relay, "v-1", "not {json", GREETING)
            .await
            .unwrap();

        let messages = store.messages();
        assert_eq!(messages[0].content, "not {json");
        assert!(messages[0].image_url.is_none());
    }
}
