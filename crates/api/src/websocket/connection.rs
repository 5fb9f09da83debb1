//! WebSocket connection handle
//!
//! An ownership handle to one live connection's outbound channel. The
//! session task that created the connection owns its lifecycle; the registry
//! only holds shared references for fan-out.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::OutboundEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique id for this connection (a visitor may have several tabs open)
    pub id: Uuid,

    /// Channel to send events to this connection
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

impl Connection {
    /// Create a new connection
    pub fn new(sender: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if the connection is closed
    #[allow(clippy::result_large_err)] // Error carries the undelivered event
    pub fn send(
        &self,
        event: OutboundEvent,
    ) -> Result<(), mpsc::error::SendError<OutboundEvent>> {
        self.sender.send(event)
    }
}
