//! Admin endpoints
//!
//! Operator-facing triggers, mounted under /admin. This surface is meant to
//! sit behind a reverse proxy; it carries no authentication of its own.

use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;

use crate::error::AppError;
use crate::AppState;

/// Create admin router
///
/// Routes:
/// - POST /ping - Originate a Ping to a remote actor
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/ping", post(ping))
}

#[derive(Debug, Deserialize)]
struct PingRequest {
    /// Target actor URI
    to: String,
}

/// POST /admin/ping
///
/// Resolves the target actor and delivers a signed Ping to its inbox.
async fn ping(
    State(state): State<AppState>,
    Json(request): Json<PingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ping_uri = state.ingest.send_ping(&request.to).await?;

    Ok(Json(serde_json::json!({
        "ping": ping_uri,
        "to": request.to,
    })))
}
