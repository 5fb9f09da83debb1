//! Live connection registry
//!
//! Process-wide table of live connections: visitor connections partitioned by
//! their conversation key, operator connections in one flat set (operators
//! listen to every conversation). Purely in-memory; nothing here persists.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;

/// Registry of live visitor and operator connections
pub struct ConnectionRegistry {
    /// Map of conversation key -> visitor connections (one per open tab)
    visitors: RwLock<HashMap<String, Vec<Arc<Connection>>>>,

    /// All operator connections
    operators: RwLock<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            visitors: RwLock::new(HashMap::new()),
            operators: RwLock::new(Vec::new()),
        }
    }

    /// Add a visitor connection under a conversation key
    pub async fn register_visitor(&self, key: &str, conn: Arc<Connection>) {
        let mut visitors = self.visitors.write().await;
        let conns = visitors.entry(key.to_string()).or_default();
        conns.push(Arc::clone(&conn));

        tracing::debug!(
            visitor_id = %key,
            connection_id = %conn.id,
            tab_count = conns.len(),
            "Visitor connection registered"
        );
    }

    /// Remove a visitor connection. No-op if the connection is already gone,
    /// so a double disconnect is harmless.
    pub async fn unregister_visitor(&self, key: &str, connection_id: &Uuid) {
        let mut visitors = self.visitors.write().await;
        if let Some(conns) = visitors.get_mut(key) {
            conns.retain(|c| c.id != *connection_id);

            // Drop empty key entries
            if conns.is_empty() {
                visitors.remove(key);
                tracing::debug!(visitor_id = %key, "Removed empty conversation entry");
            } else {
                tracing::debug!(
                    visitor_id = %key,
                    connection_id = %connection_id,
                    tab_count = conns.len(),
                    "Visitor connection unregistered"
                );
            }
        }
    }

    /// Add an operator connection
    pub async fn register_operator(&self, conn: Arc<Connection>) {
        let mut operators = self.operators.write().await;
        operators.push(Arc::clone(&conn));

        tracing::debug!(
            connection_id = %conn.id,
            operator_count = operators.len(),
            "Operator connection registered"
        );
    }

    /// Remove an operator connection; idempotent like the visitor variant.
    pub async fn unregister_operator(&self, connection_id: &Uuid) {
        let mut operators = self.operators.write().await;
        operators.retain(|c| c.id != *connection_id);

        tracing::debug!(
            connection_id = %connection_id,
            operator_count = operators.len(),
            "Operator connection unregistered"
        );
    }

    /// Snapshot of the visitor connections for a conversation key. A member
    /// may disconnect between the snapshot and delivery; callers tolerate the
    /// resulting send error.
    pub async fn visitors_for(&self, key: &str) -> Vec<Arc<Connection>> {
        let visitors = self.visitors.read().await;
        visitors.get(key).cloned().unwrap_or_default()
    }

    /// Snapshot of all operator connections
    pub async fn all_operators(&self) -> Vec<Arc<Connection>> {
        let operators = self.operators.read().await;
        operators.clone()
    }

    /// Number of live visitor connections for a conversation key
    pub async fn visitor_count(&self, key: &str) -> usize {
        let visitors = self.visitors.read().await;
        visitors.get(key).map(|v| v.len()).unwrap_or(0)
    }

    /// Total live visitor connections across all conversation keys
    pub async fn visitor_connection_count(&self) -> usize {
        let visitors = self.visitors.read().await;
        visitors.values().map(|conns| conns.len()).sum()
    }

    /// Number of live operator connections
    pub async fn operator_count(&self) -> usize {
        let operators = self.operators.read().await;
        operators.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
