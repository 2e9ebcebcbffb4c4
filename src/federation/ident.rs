//! Local identifier scheme and JSON reference normalization
//!
//! Entities this node originates are named with tag URIs:
//! `tag:<authority>,<year>:<context>/<token>` where the token is a ULID
//! (time-ordered, lexicographically sortable).

use chrono::{Datelike, Utc};

use crate::data::EntityId;

/// Generates local tag URIs for a fixed authority (the node's own host).
#[derive(Debug, Clone)]
pub struct IdentifierProvider {
    authority: String,
}

/// A parsed local tag URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUri {
    pub authority: String,
    pub year: i32,
    pub context: String,
    pub token: String,
}

impl IdentifierProvider {
    /// Create a provider for the given authority (host name).
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }

    /// The authority this provider stamps into generated identifiers.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Generate a fresh local identifier under the given context path
    /// (e.g. `follow`, `ping`, `accept/follow`).
    pub fn generate(&self, context: &str) -> String {
        let context = context.trim_matches('/');
        let year = Utc::now().year();
        let token = EntityId::new().0;

        format!("tag:{},{}:{}/{}", self.authority, year, context, token)
    }

    /// Parse a tag URI previously generated by this scheme.
    ///
    /// Returns None for anything that does not match the
    /// `tag:<authority>,<year>:<context>/<token>` shape.
    pub fn parse(value: &str) -> Option<TagUri> {
        let rest = value.strip_prefix("tag:")?;
        let (authority, rest) = rest.split_once(',')?;
        let (year, rest) = rest.split_once(':')?;
        let (context, token) = rest.rsplit_once('/')?;

        if authority.is_empty() || context.is_empty() || token.is_empty() {
            return None;
        }

        Some(TagUri {
            authority: authority.to_string(),
            year: year.parse().ok()?,
            context: context.to_string(),
            token: token.to_string(),
        })
    }
}

/// Normalize a JSON reference into a single URI string.
///
/// Inbound references may be a bare string, or an object carrying `id` or
/// `href`. Anything else is not a reference.
pub fn normalize_reference(value: &serde_json::Value) -> Option<String> {
    if let Some(uri) = value.as_str() {
        return Some(uri.to_string());
    }

    if value.is_object() {
        return value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .or_else(|| value.get("href").and_then(serde_json::Value::as_str))
            .map(str::to_string);
    }

    None
}

/// Normalize the named field of an activity into a URI, if present.
pub fn normalize_field(activity: &serde_json::Value, field: &str) -> Option<String> {
    activity.get(field).and_then(normalize_reference)
}
