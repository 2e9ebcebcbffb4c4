//! Waypost - a small federation node
//!
//! Receives signed activities on its inbox, applies them to local state and
//! answers with signed deliveries of its own.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                       │
//! │  - Actor document + inboxes                                 │
//! │  - Admin triggers                                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Federation Layer                        │
//! │  - Signature authentication + key resolution                │
//! │  - Activity ingest pipeline                                 │
//! │  - Signed outbound delivery                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                             │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for the federation and admin surfaces
//! - `federation`: signatures, key resolution, ingest, delivery
//! - `data`: database layer
//! - `config`: configuration management
//! - `error`: error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
///
/// Cloned per request; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// HTTP client for federation
    pub http_client: Arc<reqwest::Client>,

    /// The node's own signing identity
    pub local_actor: Arc<data::LocalActor>,

    /// Inbound activity processor (also originates outbound pings)
    pub ingest: Arc<federation::ActivityIngest>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Initialize HTTP client
    /// 3. Ensure the local actor identity exists (keypair on first start)
    /// 4. Wire up delivery and the ingest pipeline
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Initialize HTTP client
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent(concat!("Waypost/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );

        // 3. Ensure the local actor identity exists
        let local_actor = Arc::new(Self::ensure_local_actor(&db, &config).await?);

        // 4. Wire up delivery and ingest
        let actor_uri = format!(
            "{}/users/{}",
            config.server.base_url(),
            local_actor.username
        );
        let delivery = Arc::new(federation::ActivityDelivery::new(
            http_client.clone(),
            actor_uri.clone(),
            format!("{}#main-key", actor_uri),
            local_actor.private_key_pem.clone(),
            Duration::from_secs(config.federation.delivery_timeout_seconds),
        ));

        let ingest = Arc::new(federation::ActivityIngest::new(
            db.clone(),
            http_client.clone(),
            federation::IdentifierProvider::new(config.server.domain.clone()),
            delivery,
            config.federation.signatures_required,
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            http_client,
            local_actor,
            ingest,
        })
    }

    /// Ensure the local actor identity exists
    ///
    /// Generates an RSA-4096 keypair on first start; subsequent starts
    /// reuse the stored identity.
    async fn ensure_local_actor(
        db: &data::Database,
        config: &config::AppConfig,
    ) -> Result<data::LocalActor, error::AppError> {
        use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
        use rsa::{RsaPrivateKey, RsaPublicKey};

        if let Some(actor) = db.get_local_actor().await? {
            tracing::info!(username = %actor.username, "Local actor exists");
            return Ok(actor);
        }

        tracing::info!("Creating local actor identity...");

        let mut rng = rand::thread_rng();
        let bits = 4096;
        let private_key =
            RsaPrivateKey::new(&mut rng, bits).map_err(|e| error::AppError::Internal(e.into()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| error::AppError::Internal(e.into()))?
            .to_string();
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let actor = data::LocalActor {
            id: data::EntityId::new().0,
            username: config.actor.username.clone(),
            display_name: config.actor.display_name.clone(),
            private_key_pem,
            public_key_pem,
            created_at: chrono::Utc::now(),
        };

        db.insert_local_actor(&actor).await?;

        tracing::info!(
            username = %actor.username,
            display_name = ?actor.display_name,
            "Local actor created"
        );

        Ok(actor)
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and integration tests to keep route composition
/// consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::activitypub_router())
        .nest("/admin", api::admin_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
