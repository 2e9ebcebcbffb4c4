//! Remote key resolution
//!
//! Dereferences a signature key id to the actor document that advertises it.
//! Every inbound activity triggers a fresh fetch; the resolved document is
//! also the source for the actor's profile shadow.

use serde_json::Value;

use crate::error::AppError;
use crate::federation::ident::normalize_reference;
use crate::metrics::KEY_RESOLUTIONS_TOTAL;

/// A key resolved from a remote actor document
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    /// The fetched actor document, as received
    pub document: Value,
    /// `id` of the actor document
    pub actor_uri: String,
    /// `publicKey.owner` advertised by the document
    pub key_owner_uri: String,
    /// PEM-encoded public key material
    pub public_key_pem: String,
    /// Actor inbox, when the document advertises one
    pub inbox: Option<String>,
}

/// Resolve a key id to its owning actor document.
///
/// The key id is fetched directly (fragment stripped for the request); the
/// response must be an actor document whose `publicKey.id` matches the
/// requested key id.
///
/// # Errors
/// Any failure to fetch or extract the key maps to `UnknownKey`.
pub async fn resolve(key_id: &str, http_client: &reqwest::Client) -> Result<ResolvedKey, AppError> {
    let result = async {
        let document = fetch_document(key_id, http_client).await?;
        extract_key(key_id, document)
    }
    .await;

    let status = if result.is_ok() { "ok" } else { "error" };
    KEY_RESOLUTIONS_TOTAL.with_label_values(&[status]).inc();

    result
}

/// Resolve an actor URI (rather than a key id) to its document and key.
///
/// Used when we originate contact: the document's advertised key owner must
/// be the actor we asked for.
pub async fn resolve_actor(
    actor_uri: &str,
    http_client: &reqwest::Client,
) -> Result<ResolvedKey, AppError> {
    let result = async {
        let document = fetch_document(actor_uri, http_client).await?;
        let resolved = extract_key_unchecked(actor_uri, document)?;

        if resolved.key_owner_uri != actor_uri {
            return Err(AppError::UnknownKey(format!(
                "Document for {} advertises key owned by {}",
                actor_uri, resolved.key_owner_uri
            )));
        }
        Ok(resolved)
    }
    .await;

    let status = if result.is_ok() { "ok" } else { "error" };
    KEY_RESOLUTIONS_TOTAL.with_label_values(&[status]).inc();

    result
}

async fn fetch_document(uri: &str, http_client: &reqwest::Client) -> Result<Value, AppError> {
    let url = url::Url::parse(uri)
        .map_err(|_| AppError::UnknownKey(format!("Key id is not a URL: {}", uri)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(AppError::UnknownKey(format!(
            "Unsupported key id scheme: {}",
            url.scheme()
        )));
    }

    tracing::debug!(uri, "Fetching remote actor document");

    let response = http_client
        .get(url)
        .header(
            "Accept",
            "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
        )
        .send()
        .await
        .map_err(|e| AppError::UnknownKey(format!("Failed to fetch {}: {}", uri, e)))?;

    if !response.status().is_success() {
        return Err(AppError::UnknownKey(format!(
            "Fetch for {} returned HTTP {}",
            uri,
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::UnknownKey(format!("Document for {} not JSON: {}", uri, e)))
}

/// Pull the advertised key out of an actor document, requiring the
/// advertised key id to match the one requested.
fn extract_key(key_id: &str, document: Value) -> Result<ResolvedKey, AppError> {
    let advertised_id = document
        .get("publicKey")
        .and_then(|key| key.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::UnknownKey(format!("publicKey has no id for {}", key_id)))?;

    if advertised_id != key_id {
        return Err(AppError::UnknownKey(format!(
            "Document advertises key {} but {} was requested",
            advertised_id, key_id
        )));
    }

    extract_key_unchecked(key_id, document)
}

/// Pull the advertised key out of an actor document without matching the
/// key id against the request URI.
fn extract_key_unchecked(key_id: &str, document: Value) -> Result<ResolvedKey, AppError> {
    let actor_uri = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::UnknownKey(format!("Actor document for {} has no id", key_id)))?
        .to_string();

    let public_key = document
        .get("publicKey")
        .ok_or_else(|| AppError::UnknownKey(format!("No publicKey in document for {}", key_id)))?;

    let key_owner_uri = public_key
        .get("owner")
        .and_then(normalize_reference)
        .ok_or_else(|| AppError::UnknownKey(format!("publicKey has no owner for {}", key_id)))?;

    let public_key_pem = public_key
        .get("publicKeyPem")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::UnknownKey(format!("publicKey has no publicKeyPem for {}", key_id))
        })?
        .to_string();

    let inbox = document
        .get("inbox")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ResolvedKey {
        document,
        actor_uri,
        key_owner_uri,
        public_key_pem,
        inbox,
    })
}
