//! Livechat API Library
//!
//! This crate contains the support-chat backend: HTTP history endpoints,
//! file upload, and the WebSocket relay core.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
