//! ActivityPub endpoints
//!
//! - Actor document (so peers can resolve our key)
//! - Personal and shared inboxes

use axum::body::Bytes;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use http::HeaderMap;

use crate::error::AppError;
use crate::federation::InboundRequest;
use crate::AppState;

/// Create ActivityPub router
///
/// Routes:
/// - GET /users/:username - Actor document
/// - POST /users/:username/inbox - Personal inbox
/// - POST /inbox - Shared inbox
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/users/:username", get(actor))
        .route("/users/:username/inbox", post(inbox))
        .route("/inbox", post(shared_inbox))
}

/// GET /users/:username
///
/// Returns the local actor document, including the public key peers use to
/// verify our deliveries.
///
/// Content-Type: application/activity+json
async fn actor(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.local_actor.username != username {
        return Err(AppError::NotFound);
    }

    let base_url = state.config.server.base_url();
    let actor_url = format!("{}/users/{}", base_url, username);

    Ok(Json(serde_json::json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            "https://w3id.org/security/v1"
        ],
        "type": "Application",
        "id": actor_url.clone(),
        "preferredUsername": state.local_actor.username,
        "name": state
            .local_actor
            .display_name
            .clone()
            .unwrap_or_else(|| state.local_actor.username.clone()),
        "inbox": format!("{}/inbox", actor_url),
        "url": actor_url.clone(),
        "endpoints": {
            "sharedInbox": format!("{}/inbox", base_url)
        },
        "publicKey": {
            "id": format!("{}#main-key", actor_url),
            "owner": actor_url,
            "publicKeyPem": state.local_actor.public_key_pem
        }
    })))
}

/// POST /users/:username/inbox
///
/// Receives incoming activities for the local actor.
async fn inbox(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), AppError> {
    if state.local_actor.username != username {
        return Err(AppError::NotFound);
    }

    let request = InboundRequest {
        method: "POST".to_string(),
        path: format!("/users/{}/inbox", username),
        headers,
        body: body.to_vec(),
    };

    state.ingest.process(request).await
}

/// POST /inbox
///
/// Shared inbox: same pipeline as the personal inbox.
async fn shared_inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), AppError> {
    let request = InboundRequest {
        method: "POST".to_string(),
        path: "/inbox".to_string(),
        headers,
        body: body.to_vec(),
    };

    state.ingest.process(request).await
}
