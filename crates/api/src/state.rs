//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::websocket::registry::ConnectionRegistry;

/// State shared by all request handlers and connection tasks.
///
/// The registry is an owned, lifecycle-scoped instance constructed at process
/// start; tests build their own isolated instances.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }
}
