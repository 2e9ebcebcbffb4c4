//! API layer
//!
//! Axum routers for the federation surface, the admin triggers and the
//! metrics endpoint.

mod activitypub;
mod admin;

pub use activitypub::activitypub_router;
pub use admin::admin_router;

use axum::{routing::get, Router};

/// Create metrics router
///
/// Stateless; exposes the Prometheus registry in text format.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics))
}

/// GET /metrics
async fn metrics() -> String {
    crate::metrics::gather()
}
