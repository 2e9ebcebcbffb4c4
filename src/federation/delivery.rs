//! Activity delivery
//!
//! Signed POSTs of activity payloads to remote inboxes. Responses to
//! inbound traffic (Accept, Pong) are delivered best-effort: a failed
//! send is logged and counted but never fails the inbound request.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::metrics::{DELIVERIES_TOTAL, DELIVERY_DURATION_SECONDS};

/// Activity delivery service
///
/// Signs outbound requests with the local actor's key.
#[derive(Clone)]
pub struct ActivityDelivery {
    http_client: Arc<reqwest::Client>,
    /// Local actor URI
    actor_uri: String,
    /// Key ID for signatures
    key_id: String,
    /// Private key for signing
    private_key_pem: String,
    /// Per-request timeout
    timeout: Duration,
}

impl ActivityDelivery {
    /// Create new delivery service
    pub fn new(
        http_client: Arc<reqwest::Client>,
        actor_uri: String,
        key_id: String,
        private_key_pem: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            actor_uri,
            key_id,
            private_key_pem,
            timeout,
        }
    }

    /// Local actor URI deliveries are attributed to.
    pub fn actor_uri(&self) -> &str {
        &self.actor_uri
    }

    /// Deliver an activity to a single inbox
    ///
    /// # Errors
    /// Returns error if delivery fails (network, signature, rejection)
    pub async fn deliver(
        &self,
        inbox_uri: &str,
        activity: &serde_json::Value,
    ) -> Result<(), AppError> {
        let started = std::time::Instant::now();
        let result = self.deliver_inner(inbox_uri, activity).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        DELIVERIES_TOTAL.with_label_values(&[status]).inc();
        DELIVERY_DURATION_SECONDS
            .with_label_values(&[status])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn deliver_inner(
        &self,
        inbox_uri: &str,
        activity: &serde_json::Value,
    ) -> Result<(), AppError> {
        // 1. Serialize activity
        let body = serde_json::to_vec(activity)
            .map_err(|e| AppError::Validation(format!("Failed to serialize activity: {}", e)))?;

        // 2. Sign request
        let sig_headers = crate::federation::sign_request(
            "POST",
            inbox_uri,
            Some(&body),
            &self.private_key_pem,
            &self.key_id,
        )?;

        // 3. POST to inbox with signed headers
        let mut request = self
            .http_client
            .post(inbox_uri)
            .timeout(self.timeout)
            .header("Content-Type", "application/activity+json")
            .header("Date", sig_headers.date)
            .header("Signature", sig_headers.signature);

        if let Some(digest) = sig_headers.digest {
            request = request.header("Digest", digest);
        }

        let response = request.body(body).send().await.map_err(|e| {
            AppError::Federation(format!("Failed to deliver to {}: {}", inbox_uri, e))
        })?;

        // 4. Handle response
        if !response.status().is_success() {
            return Err(AppError::Federation(format!(
                "Inbox {} rejected activity: HTTP {}",
                inbox_uri,
                response.status()
            )));
        }

        tracing::info!("Successfully delivered activity to {}", inbox_uri);
        Ok(())
    }

    /// Deliver without propagating failure.
    ///
    /// Used for responses to inbound activities, where the triggering
    /// request must succeed regardless of the remote inbox.
    pub async fn deliver_best_effort(&self, inbox_uri: &str, activity: &serde_json::Value) {
        if let Err(e) = self.deliver(inbox_uri, activity).await {
            tracing::warn!(inbox_uri, error = %e, "Best-effort delivery failed");
        }
    }

    /// Send an Accept for a stored follow request.
    pub async fn send_accept(
        &self,
        accept_uri: &str,
        follow_actor_uri: &str,
        follow_object_uri: &str,
        follower_inbox_uri: &str,
    ) -> Result<(), AppError> {
        // The Accept is issued by the followed object.
        let activity = builder::accept(
            accept_uri,
            follow_object_uri,
            follow_actor_uri,
            follow_object_uri,
        );

        self.deliver(follower_inbox_uri, &activity).await?;

        tracing::info!(
            "Sent Accept {} to {} for follow by {}",
            accept_uri,
            follower_inbox_uri,
            follow_actor_uri
        );
        Ok(())
    }

    /// Send a Pong answering a received Ping.
    pub async fn send_pong(
        &self,
        pong_uri: &str,
        ping_uri: &str,
        ping_actor_uri: &str,
        target_inbox_uri: &str,
    ) -> Result<(), AppError> {
        let activity = builder::pong(pong_uri, &self.actor_uri, ping_actor_uri, ping_uri);

        self.deliver(target_inbox_uri, &activity).await?;

        tracing::info!("Sent Pong {} for Ping {}", pong_uri, ping_uri);
        Ok(())
    }

    /// Send a Ping to a remote actor.
    pub async fn send_ping(
        &self,
        ping_uri: &str,
        target_actor_uri: &str,
        target_inbox_uri: &str,
    ) -> Result<(), AppError> {
        let activity = builder::ping(ping_uri, &self.actor_uri, target_actor_uri);

        self.deliver(target_inbox_uri, &activity).await?;

        tracing::info!("Sent Ping {} to {}", ping_uri, target_actor_uri);
        Ok(())
    }
}

/// Build activity JSON payloads
pub mod builder {
    use serde_json::Value;

    /// Build an Accept activity for a follow request.
    ///
    /// The embedded Follow carries the Accept's own id, so the recipient
    /// can correlate the response without a stored copy of its request.
    pub fn accept(id: &str, actor: &str, follow_actor: &str, follow_object: &str) -> Value {
        serde_json::json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Accept",
            "id": id,
            "actor": actor,
            "object": {
                "type": "Follow",
                "id": id,
                "actor": follow_actor,
                "object": follow_object
            }
        })
    }

    /// Build a Ping activity
    pub fn ping(id: &str, actor: &str, to: &str) -> Value {
        serde_json::json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Ping",
            "id": id,
            "actor": actor,
            "to": to
        })
    }

    /// Build a Pong activity answering a Ping
    pub fn pong(id: &str, actor: &str, to: &str, ping_uri: &str) -> Value {
        serde_json::json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Pong",
            "id": id,
            "actor": actor,
            "to": to,
            "object": ping_uri
        })
    }
}
