//! Common test utilities for E2E tests

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use waypost::{config, AppState};

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a test server with signature enforcement disabled.
    ///
    /// Key resolution still runs against the fake remotes, so every
    /// inbound request needs a Signature header naming a resolvable key.
    pub async fn new() -> Self {
        Self::with_signatures(false).await
    }

    /// Create a test server with explicit signature enforcement.
    pub async fn with_signatures(signatures_required: bool) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "test.example.com".to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            federation: config::FederationConfig {
                signatures_required,
                delivery_timeout_seconds: 5,
            },
            actor: config::ActorConfig {
                username: "waypost".to_string(),
                display_name: Some("Test Node".to_string()),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Seed the local actor with a small keypair so state init does not
        // spend test time on 4096-bit generation.
        let db = waypost::data::Database::connect(&db_path).await.unwrap();
        let (private_key_pem, public_key_pem) = generate_keypair();
        db.insert_local_actor(&waypost::data::LocalActor {
            id: waypost::data::EntityId::new().0,
            username: "waypost".to_string(),
            display_name: Some("Test Node".to_string()),
            private_key_pem,
            public_key_pem,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
        drop(db);

        let state = AppState::new(config).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = waypost::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST an activity to the local actor's inbox with a Signature header
    /// naming the given key id.
    pub async fn post_inbox(&self, key_id: &str, activity: &Value) -> reqwest::Response {
        let signature = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"(request-target) host date\",signature=\"ZmFrZQ==\"",
            key_id
        );

        self.client
            .post(self.url("/users/waypost/inbox"))
            .header("Content-Type", "application/activity+json")
            .header("Signature", signature)
            .json(activity)
            .send()
            .await
            .unwrap()
    }
}

/// Generate an RSA keypair (small, for test speed).
pub fn generate_keypair() -> (String, String) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap()
        .to_string();
    let public_key_pem = public_key.to_public_key_pem(LineEnding::LF).unwrap();

    (private_key_pem, public_key_pem)
}

#[derive(Clone)]
struct RemoteState {
    actor_doc: Value,
    inbox_payloads: Arc<Mutex<Vec<Value>>>,
    inbox_status: StatusCode,
}

/// A fake remote node: serves one actor document and records everything
/// POSTed to its inbox.
pub struct FakeRemote {
    pub actor_uri: String,
    pub key_id: String,
    pub private_key_pem: String,
    inbox_payloads: Arc<Mutex<Vec<Value>>>,
}

impl FakeRemote {
    /// Spawn a fake remote hosting `username` with a healthy inbox.
    pub async fn spawn(username: &str) -> Self {
        Self::spawn_with(username, StatusCode::ACCEPTED, None).await
    }

    /// Spawn a fake remote whose inbox answers with the given status.
    pub async fn spawn_failing(username: &str) -> Self {
        Self::spawn_with(username, StatusCode::INTERNAL_SERVER_ERROR, None).await
    }

    /// Spawn a fake remote whose key document claims a different owner.
    pub async fn spawn_with_key_owner(username: &str, owner_uri: &str) -> Self {
        Self::spawn_with(username, StatusCode::ACCEPTED, Some(owner_uri.to_string())).await
    }

    async fn spawn_with(
        username: &str,
        inbox_status: StatusCode,
        owner_override: Option<String>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let actor_uri = format!("{}/users/{}", base, username);
        let key_id = format!("{}#main-key", actor_uri);
        let owner = owner_override.unwrap_or_else(|| actor_uri.clone());
        let (private_key_pem, public_key_pem) = generate_keypair();

        let actor_doc = serde_json::json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Person",
            "id": actor_uri,
            "preferredUsername": username,
            "name": format!("{} (remote)", username),
            "url": format!("{}/@{}", base, username),
            "inbox": format!("{}/inbox", actor_uri),
            "publicKey": {
                "id": key_id,
                "owner": owner,
                "publicKeyPem": public_key_pem
            }
        });

        let inbox_payloads = Arc::new(Mutex::new(Vec::new()));
        let state = RemoteState {
            actor_doc,
            inbox_payloads: inbox_payloads.clone(),
            inbox_status,
        };

        let app = Router::new()
            .route("/users/:username", get(serve_actor))
            .route("/users/:username/inbox", post(record_inbox))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Self {
            actor_uri,
            key_id,
            private_key_pem,
            inbox_payloads,
        }
    }

    /// Everything delivered to this remote's inbox so far.
    pub fn deliveries(&self) -> Vec<Value> {
        self.inbox_payloads.lock().unwrap().clone()
    }
}

async fn serve_actor(State(state): State<RemoteState>) -> Json<Value> {
    Json(state.actor_doc.clone())
}

async fn record_inbox(
    State(state): State<RemoteState>,
    _path: Path<String>,
    body: Bytes,
) -> StatusCode {
    if let Ok(payload) = serde_json::from_slice::<Value>(&body) {
        state.inbox_payloads.lock().unwrap().push(payload);
    }
    state.inbox_status
}
