//! Event fan-out
//!
//! Delivers an outbound event to every visitor connection on a conversation
//! and every operator connection. Delivery is best-effort: a failed send is
//! logged and skipped, and removal of the dead connection is left to the
//! session that owns it.

use std::sync::Arc;

use super::events::OutboundEvent;
use super::registry::ConnectionRegistry;

/// Fans events out to registry members for a routing key.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast an event to every visitor connection registered under
    /// `conversation_key` and to every operator connection.
    ///
    /// Operator copies that lack a conversation reference get the routing key
    /// injected so operators can demultiplex; visitor copies are always
    /// delivered verbatim since visitors are scoped to one conversation.
    pub async fn broadcast(&self, conversation_key: &str, event: &OutboundEvent) {
        let mut delivered = 0;
        let mut failed = 0;

        // Snapshot first so no lock is held while delivering
        let visitors = self.registry.visitors_for(conversation_key).await;
        for conn in &visitors {
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    failed += 1;
                    tracing::warn!(
                        visitor_id = %conversation_key,
                        connection_id = %conn.id,
                        "Failed to send event to visitor connection (likely closed)"
                    );
                }
            }
        }

        let operator_event = if event.has_conversation_key() {
            event.clone()
        } else {
            event.with_conversation_key(conversation_key)
        };

        let operators = self.registry.all_operators().await;
        for conn in &operators {
            match conn.send(operator_event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    failed += 1;
                    tracing::warn!(
                        connection_id = %conn.id,
                        "Failed to send event to operator connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            visitor_id = %conversation_key,
            recipients = delivered,
            failed = failed,
            "Broadcast event"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::websocket::connection::Connection;
    use crate::websocket::events::{ConversationRef, MessageEvent, OutboundEvent};
    use livechat_shared::SenderType;
    use time::OffsetDateTime;
    use tokio::sync::mpsc;

    fn message_event(conversation_id: Option<ConversationRef>) -> OutboundEvent {
        OutboundEvent::Message(MessageEvent {
            id: 1,
            conversation_id,
            visitor_id: "v-1".to_string(),
            content: "hello".to_string(),
            sender_type: SenderType::Visitor,
            image_url: None,
            is_read: false,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    #[tokio::test]
    async fn test_broadcast_reaches_visitors_and_operators() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));

        let (visitor_tx, mut visitor_rx) = mpsc::unbounded_channel();
        let (operator_tx, mut operator_rx) = mpsc::unbounded_channel();
        registry
            .register_visitor("v-1", Arc::new(Connection::new(visitor_tx)))
            .await;
        registry
            .register_operator(Arc::new(Connection::new(operator_tx)))
            .await;

        relay
            .broadcast("v-1", &message_event(Some(ConversationRef::Id(7))))
            .await;

        assert!(visitor_rx.try_recv().is_ok());
        assert!(operator_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_without_visitors_still_reaches_operators() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));

        let (operator_tx, mut operator_rx) = mpsc::unbounded_channel();
        registry
            .register_operator(Arc::new(Connection::new(operator_tx)))
            .await;

        relay
            .broadcast("no-visitors-here", &message_event(Some(ConversationRef::Id(7))))
            .await;

        assert!(operator_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_failing_member_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));

        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx); // Every send to this connection fails
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (operator_tx, mut operator_rx) = mpsc::unbounded_channel();

        registry
            .register_visitor("v-1", Arc::new(Connection::new(dead_tx)))
            .await;
        registry
            .register_visitor("v-1", Arc::new(Connection::new(live_tx)))
            .await;
        registry
            .register_operator(Arc::new(Connection::new(operator_tx)))
            .await;

        relay
            .broadcast("v-1", &message_event(Some(ConversationRef::Id(7))))
            .await;

        assert!(live_rx.try_recv().is_ok());
        assert!(operator_rx.try_recv().is_ok());

        // Failed delivery must not unregister the connection; that is the
        // owning session's job on disconnect.
        assert_eq!(registry.visitor_count("v-1").await, 2);
    }

    #[tokio::test]
    async fn test_key_injected_for_operators_only() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));

        let (visitor_tx, mut visitor_rx) = mpsc::unbounded_channel();
        let (operator_tx, mut operator_rx) = mpsc::unbounded_channel();
        registry
            .register_visitor("v-1", Arc::new(Connection::new(visitor_tx)))
            .await;
        registry
            .register_operator(Arc::new(Connection::new(operator_tx)))
            .await;

        relay.broadcast("v-1", &message_event(None)).await;

        let visitor_copy = serde_json::to_value(visitor_rx.try_recv().unwrap()).unwrap();
        let operator_copy = serde_json::to_value(operator_rx.try_recv().unwrap()).unwrap();
        assert!(visitor_copy.get("conversation_id").is_none());
        assert_eq!(operator_copy["conversation_id"], "v-1");
    }

    #[tokio::test]
    async fn test_numeric_id_not_overwritten_for_operators() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(Arc::clone(&registry));

        let (operator_tx, mut operator_rx) = mpsc::unbounded_channel();
        registry
            .register_operator(Arc::new(Connection::new(operator_tx)))
            .await;

        relay
            .broadcast("v-1", &message_event(Some(ConversationRef::Id(7))))
            .await;

        let operator_copy = serde_json::to_value(operator_rx.try_recv().unwrap()).unwrap();
        assert_eq!(operator_copy["conversation_id"], 7);
    }
}
