use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::SessionMiddleware;

/// Inbound events are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

const DEFAULT_MAX_CONNECTIONS: usize = 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionMiddleware>,
    pub max_connections: usize,
}

impl AppState {
    pub fn new(sessions: SessionMiddleware) -> Self {
        Self {
            sessions: Arc::new(sessions),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let max_connections = state.max_connections;

    let api_v1 = Router::new()
        .route("/events", post(handlers::v1::handle_event))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
