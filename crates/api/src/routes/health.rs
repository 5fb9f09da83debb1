//! Health check endpoints
//!
//! Reports database connectivity plus a snapshot of the live relay state so
//! operators can see at a glance how many sockets the process is carrying.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub connections: ConnectionCounts,
}

/// Live connection counts taken from the registry
#[derive(Serialize)]
pub struct ConnectionCounts {
    pub visitors: usize,
    pub operators: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let status_code = if database == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if status_code == StatusCode::OK {
            "healthy"
        } else {
            "unhealthy"
        },
        version: env!("CARGO_PKG_VERSION"),
        database,
        connections: ConnectionCounts {
            visitors: state.registry.visitor_connection_count().await,
            operators: state.registry.operator_count().await,
        },
    };

    (status_code, Json(response))
}

/// Liveness probe (the process is up and serving)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (the database is reachable, so traffic can flow)
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
