use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use intake_gateway_protocol::InboundEvent;
use tracing::error;

use crate::middleware::{HandlerOutcome, HandlerStatus};
use crate::server::AppState;

/// POST /api/v1/events
///
/// Runs one gateway event through the registration flow and returns the
/// messages to deliver. Storage failures answer 503 with the apology message
/// in the body so the gateway can both show it and redeliver later.
///
/// Handling runs on its own task. A request timeout or a dropped connection
/// abandons only the response, never a half-applied event whose marker is
/// already set.
pub async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> (StatusCode, Json<HandlerOutcome>) {
    let sessions = state.sessions.clone();
    let outcome = match tokio::spawn(async move { sessions.handle(&event).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Event handling task failed");
            HandlerOutcome::failed()
        }
    };
    let status = match outcome.status {
        HandlerStatus::Handled | HandlerStatus::Duplicate => StatusCode::OK,
        HandlerStatus::Failed => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(outcome))
}
