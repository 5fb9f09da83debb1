//! Operator session
//!
//! One task per operator connection. Operators are global listeners; each
//! outbound frame they send targets one visitor's conversation by its key.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
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
    events::{OperatorFrame, OutboundEvent},
    relay::Relay,
};

/// WebSocket handler for `/ws/operator`
pub async fn operator_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::info!("Operator WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_operator_socket(socket, state))
}

/// Handle one operator connection from handshake to disconnect
async fn handle_operator_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
    let conn = Arc::new(Connection::new(tx));
    let connection_id = conn.id;
    state.registry.register_operator(Arc::clone(&conn)).await;

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
                    if let Err(e) = handle_operator_frame(&store, &relay, &text).await {
                        tracing::error!(
                            error = %e,
                            connection_id = %connection_id,
                            "Failed to process operator frame"
                        );
                    }
                }
                WsMessage::Close(_) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        "WebSocket close frame received"
                    );
                    break;
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                _ => {}
            }
        }
    }

    tracing::info!(connection_id = %connection_id, "Operator connection closing");
    state.registry.unregister_operator(&connection_id).await;
    send_task.abort();
}

/// Process one operator frame: validate, resolve the target conversation,
/// persist, and fan out keyed by the visitor id.
///
/// Frames that fail validation or target an unknown visitor key are dropped
/// without surfacing an error to the operator.
pub(crate) async fn handle_operator_frame<S: ChatStore>(
    store: &S,
    relay: &Relay,
    frame: &str,
) -> Result<(), ChatError> {
    let Some(frame) = OperatorFrame::parse(frame) else {
        tracing::debug!("Dropping invalid operator frame");
        return Ok(());
    };

    let Some(conversation) = store.find_active_conversation(&frame.visitor_id).await? else {
        tracing::debug!(
            visitor_id = %frame.visitor_id,
            "Dropping operator frame for unknown conversation"
        );
        return Ok(());
    };

    let message = store
        .append_message(
            conversation.id,
            SenderType::Operator,
            &frame.content,
            frame.image_url.as_deref(),
        )
        .await?;
    relay
        .broadcast(
            &frame.visitor_id,
            &OutboundEvent::message(&message, &frame.visitor_id),
        )
        .await;

    Ok(())
}
