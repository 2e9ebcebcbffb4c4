//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for generated tokens and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Local actor
// =============================================================================

/// The single local actor identity for this node
///
/// Holds the RSA keypair used to sign outbound deliveries.
/// Only one row exists in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocalActor {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    /// RSA private key (PEM format)
    pub private_key_pem: String,
    /// RSA public key (PEM format)
    pub public_key_pem: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Remote actor shadow
// =============================================================================

/// Shadow record of a remote actor
///
/// Upserted every time an authenticated activity from that actor is
/// processed; never deleted. Last writer wins under concurrent upserts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    /// Actor URI (primary key)
    pub actor_uri: String,
    pub url: Option<String>,
    /// Inbox URI for delivery
    pub inbox: Option<String>,
    /// preferredUsername from the actor document
    pub name: Option<String>,
    pub display_name: Option<String>,
    /// When this shadow was last refreshed
    pub cached_at: DateTime<Utc>,
}

// =============================================================================
// Relations
// =============================================================================

/// A directed follow relation actor -> object
///
/// At most one active Follow per (actor_uri, object_uri) pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    /// Activity URI (primary key); locally generated if the inbound
    /// activity carried no id
    pub uri: String,
    /// URI of the locally generated Accept response
    pub accept_uri: String,
    pub actor_uri: String,
    pub object_uri: String,
    pub created_at: DateTime<Utc>,
}

/// A directed like relation actor -> object
///
/// Same uniqueness invariant as Follow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Like {
    pub uri: String,
    pub actor_uri: String,
    pub object_uri: String,
    pub created_at: DateTime<Utc>,
}

/// A handshake request
///
/// Keyed by the activity's own URI: repeated pings from the same actor to
/// the same target are distinct events, deduplicated only by exact id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ping {
    pub uri: String,
    pub actor_uri: String,
    pub to_uri: String,
    pub created_at: DateTime<Utc>,
}

/// Reply to exactly one Ping
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pong {
    pub uri: String,
    /// Originating Ping (unique: one Pong per Ping)
    pub ping_uri: String,
    pub created_at: DateTime<Utc>,
}
