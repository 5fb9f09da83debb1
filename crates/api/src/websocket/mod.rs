//! WebSocket relay core
//!
//! Tracks live visitor and operator connections, fans persisted messages out
//! to the right subset of peers, and runs the per-connection session loops.

pub mod connection;
pub mod events;
pub mod operator;
pub mod registry;
pub mod relay;
pub mod visitor;

pub use connection::Connection;
pub use events::OutboundEvent;
pub use operator::operator_ws_handler;
pub use registry::ConnectionRegistry;
pub use relay::Relay;
pub use visitor::visitor_ws_handler;
