//! API routes

pub mod conversations;
pub mod health;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    state::AppState,
    websocket::{operator_ws_handler, visitor_ws_handler},
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Widget and operator-console REST API
    let api_routes = Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/:visitor_id",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/:visitor_id/read",
            post(conversations::mark_messages_read),
        )
        .route("/upload", post(upload::upload_file))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024));

    // Live relay endpoints
    let ws_routes = Router::new()
        .route("/ws/visitor/:visitor_id", get(visitor_ws_handler))
        .route("/ws/operator", get(operator_ws_handler));

    let cors = build_cors(&state.config.allowed_origins);
    let upload_dir = state.config.upload_dir.clone();

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .merge(ws_routes)
        .nest_service("/static", ServeDir::new(upload_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
