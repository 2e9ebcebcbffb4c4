//! Inbound activity processing
//!
//! Single pipeline for every activity POSTed to an inbox: shape validation,
//! actor normalization, signature authentication, actor/key cross-check,
//! profile refresh, then dispatch by type. Authentication happens before any
//! write; a request rejected at any stage leaves no trace in storage.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::data::{Database, Follow, Like, Ping, Pong, Profile, RelationKind};
use crate::error::AppError;
use crate::federation::delivery::ActivityDelivery;
use crate::federation::ident::{normalize_field, normalize_reference, IdentifierProvider};
use crate::federation::{key_resolver, signature};
use crate::metrics::ACTIVITIES_RECEIVED_TOTAL;

/// Raw inbound request, as needed for signature verification.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Request path as signed by the sender (no scheme or host)
    pub path: String,
    pub headers: http::HeaderMap,
    pub body: Vec<u8>,
}

/// The sender of an authenticated activity.
#[derive(Debug, Clone)]
struct RemoteActor {
    uri: String,
    inbox: Option<String>,
}

/// A validated inbound activity.
///
/// Raw JSON does not travel past the parse step; each variant carries
/// exactly the fields its handler needs.
#[derive(Debug, Clone)]
enum Activity {
    Follow { id: Option<String>, object: String },
    Like { id: Option<String>, object: String },
    Ping { id: Option<String>, to: String },
    Pong,
    Create,
    Undo(UndoTarget),
    Other,
}

/// What an Undo points at.
#[derive(Debug, Clone)]
struct UndoTarget {
    /// URI of the original activity, when the object carries one
    /// (bare string, or embedded object with id/href).
    reference: Option<String>,
    /// Embedded relation fields, when the object is itself an object.
    embedded: Option<EmbeddedRelation>,
}

#[derive(Debug, Clone)]
struct EmbeddedRelation {
    actor: Option<String>,
    kind: Option<String>,
    object: Option<String>,
}

/// Parse an activity body into its typed form.
///
/// Required fields missing for a recognized type fail with
/// `MalformedActivity`; unrecognized types parse to `Other`.
fn parse_activity(activity_type: &str, value: &Value) -> Result<Activity, AppError> {
    let required = |field: &str| {
        normalize_field(value, field).ok_or_else(|| {
            AppError::MalformedActivity(format!("{} has no {}", activity_type, field))
        })
    };

    match activity_type {
        "Follow" => Ok(Activity::Follow {
            id: normalize_field(value, "id"),
            object: required("object")?,
        }),
        "Like" => Ok(Activity::Like {
            id: normalize_field(value, "id"),
            object: required("object")?,
        }),
        "Ping" => Ok(Activity::Ping {
            id: normalize_field(value, "id"),
            to: required("to")?,
        }),
        "Pong" => Ok(Activity::Pong),
        "Create" => Ok(Activity::Create),
        "Undo" => {
            let object = value.get("object").ok_or_else(|| {
                AppError::MalformedActivity("Undo has no object".to_string())
            })?;

            let reference = normalize_reference(object);
            let embedded = object.as_object().map(|_| EmbeddedRelation {
                actor: normalize_field(object, "actor"),
                kind: object
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                object: normalize_field(object, "object"),
            });

            if reference.is_none() && embedded.is_none() {
                return Err(AppError::MalformedActivity(
                    "Undo object is neither a reference nor an embedded object".to_string(),
                ));
            }

            Ok(Activity::Undo(UndoTarget {
                reference,
                embedded,
            }))
        }
        _ => Ok(Activity::Other),
    }
}

/// Inbound activity processor
///
/// One instance per node, shared across requests.
pub struct ActivityIngest {
    db: Arc<Database>,
    http_client: Arc<reqwest::Client>,
    identifiers: IdentifierProvider,
    delivery: Arc<ActivityDelivery>,
    /// When false, key resolution still runs but cryptographic
    /// verification is skipped.
    signatures_required: bool,
}

impl ActivityIngest {
    pub fn new(
        db: Arc<Database>,
        http_client: Arc<reqwest::Client>,
        identifiers: IdentifierProvider,
        delivery: Arc<ActivityDelivery>,
        signatures_required: bool,
    ) -> Self {
        Self {
            db,
            http_client,
            identifiers,
            delivery,
            signatures_required,
        }
    }

    /// Process one inbound activity.
    ///
    /// # Errors
    /// Each pipeline stage maps to its own `AppError` variant; see
    /// `error.rs` for the HTTP status each carries.
    pub async fn process(&self, request: InboundRequest) -> Result<(), AppError> {
        // 1. Shape validation.
        let body: Value = serde_json::from_slice(&request.body)
            .map_err(|e| AppError::MalformedActivity(format!("Body is not JSON: {}", e)))?;

        if !body.is_object() {
            return Err(AppError::MalformedActivity(
                "Activity must be a JSON object".to_string(),
            ));
        }

        let activity_type = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::MalformedActivity("Activity has no type".to_string()))?
            .to_string();

        // 2. Actor normalization: embedded actor objects collapse to their id.
        let actor_uri = normalize_field(&body, "actor")
            .ok_or_else(|| AppError::MalformedActivity("Activity has no actor".to_string()))?;

        let activity = parse_activity(&activity_type, &body)?;

        // 3. Authentication.
        let resolved = self.authenticate(&request).await?;

        // 4. Identity cross-check. All three names must agree before
        //    anything is written.
        if resolved.actor_uri != resolved.key_owner_uri || resolved.actor_uri != actor_uri {
            return Err(AppError::ActorKeyMismatch(format!(
                "Activity actor {} does not match key owner {} / document actor {}",
                actor_uri, resolved.key_owner_uri, resolved.actor_uri
            )));
        }

        // 5. Profile refresh for the now-trusted actor.
        let profile = profile_from_document(&actor_uri, &resolved.document, resolved.inbox.clone());
        self.db.upsert_profile(&profile).await?;

        let actor = RemoteActor {
            uri: actor_uri,
            inbox: resolved.inbox,
        };

        ACTIVITIES_RECEIVED_TOTAL
            .with_label_values(&[activity_type.as_str()])
            .inc();

        // 6. Dispatch.
        match activity {
            Activity::Follow { id, object } => self.handle_follow(&actor, id, object).await,
            Activity::Like { id, object } => self.handle_like(&actor, id, object).await,
            Activity::Ping { id, to } => self.handle_ping(&actor, id, to).await,
            Activity::Undo(target) => self.handle_undo(&actor, target).await,
            // Pong and Create are accepted and recorded only in the log.
            Activity::Pong | Activity::Create => {
                tracing::debug!(activity_type, actor_uri = %actor.uri, "Accepted no-op activity");
                Ok(())
            }
            Activity::Other => {
                tracing::debug!(
                    activity_type,
                    actor_uri = %actor.uri,
                    "Dropping unrecognized activity type"
                );
                Ok(())
            }
        }
    }

    /// Stage 3: authenticate the request via its Signature header.
    async fn authenticate(
        &self,
        request: &InboundRequest,
    ) -> Result<key_resolver::ResolvedKey, AppError> {
        let header = request
            .headers
            .get("signature")
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::MissingSignature)?;

        let fields = signature::parse_signature_header(header)?;
        let parsed = signature::validate_signature_model(fields)?;

        // The key is re-fetched on every request; staleness is impossible,
        // at the cost of one remote round trip per inbound activity.
        let resolved = key_resolver::resolve(&parsed.key_id, &self.http_client).await?;

        if self.signatures_required {
            signature::verify_signature(
                &request.method,
                &request.path,
                &request.headers,
                Some(&request.body),
                &parsed,
                &resolved.public_key_pem,
            )?;
        } else {
            tracing::debug!(
                key_id = %parsed.key_id,
                "Signature enforcement disabled; key resolved but not verified"
            );
        }

        Ok(resolved)
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    async fn handle_follow(
        &self,
        actor: &RemoteActor,
        id: Option<String>,
        object_uri: String,
    ) -> Result<(), AppError> {
        // Inbound activities without an id get a locally minted one.
        let uri = id.unwrap_or_else(|| self.identifiers.generate("follow"));

        if self.db.follow_exists(&actor.uri, &object_uri).await? {
            tracing::info!(actor_uri = %actor.uri, object_uri, "Follow already recorded");
            return Ok(());
        }

        let follow = Follow {
            uri,
            accept_uri: self.identifiers.generate("accept/follow"),
            actor_uri: actor.uri.clone(),
            object_uri: object_uri.clone(),
            created_at: Utc::now(),
        };

        if !self.db.insert_follow(&follow).await? {
            tracing::info!(actor_uri = %actor.uri, object_uri, "Follow already recorded");
            return Ok(());
        }

        tracing::info!(uri = %follow.uri, actor_uri = %actor.uri, object_uri, "Recorded Follow");

        // Accept is a response to inbound traffic: failures must not fail
        // the request that triggered it.
        match &actor.inbox {
            Some(inbox) => {
                if let Err(e) = self
                    .delivery
                    .send_accept(&follow.accept_uri, &actor.uri, &object_uri, inbox)
                    .await
                {
                    tracing::warn!(inbox, error = %e, "Accept delivery failed");
                }
            }
            None => {
                tracing::warn!(actor_uri = %actor.uri, "Follower has no inbox, Accept not sent");
            }
        }

        Ok(())
    }

    async fn handle_like(
        &self,
        actor: &RemoteActor,
        id: Option<String>,
        object_uri: String,
    ) -> Result<(), AppError> {
        let uri = id.unwrap_or_else(|| self.identifiers.generate("like"));

        if self.db.like_exists(&actor.uri, &object_uri).await? {
            tracing::info!(actor_uri = %actor.uri, object_uri, "Like already recorded");
            return Ok(());
        }

        let like = Like {
            uri,
            actor_uri: actor.uri.clone(),
            object_uri: object_uri.clone(),
            created_at: Utc::now(),
        };

        if !self.db.insert_like(&like).await? {
            tracing::info!(actor_uri = %actor.uri, object_uri, "Like already recorded");
            return Ok(());
        }

        tracing::info!(uri = %like.uri, actor_uri = %actor.uri, object_uri, "Recorded Like");
        Ok(())
    }

    async fn handle_ping(
        &self,
        actor: &RemoteActor,
        id: Option<String>,
        to_uri: String,
    ) -> Result<(), AppError> {
        // Pings are deduplicated by exact activity id: the same actor
        // pinging twice under fresh ids is two events.
        let uri = id.unwrap_or_else(|| self.identifiers.generate("ping"));

        if self.db.ping_exists(&uri).await? {
            tracing::info!(uri, actor_uri = %actor.uri, "Ping replay suppressed");
            return Ok(());
        }

        let ping = Ping {
            uri: uri.clone(),
            actor_uri: actor.uri.clone(),
            to_uri,
            created_at: Utc::now(),
        };
        let pong = Pong {
            uri: self.identifiers.generate("pong"),
            ping_uri: uri.clone(),
            created_at: Utc::now(),
        };

        // Ping and Pong land in one transaction; a duplicate means another
        // request already answered this Ping.
        if !self.db.insert_ping_with_pong(&ping, &pong).await? {
            tracing::info!(uri, actor_uri = %actor.uri, "Ping replay suppressed");
            return Ok(());
        }

        tracing::info!(uri, actor_uri = %actor.uri, pong_uri = %pong.uri, "Recorded Ping");

        match &actor.inbox {
            Some(inbox) => {
                if let Err(e) = self
                    .delivery
                    .send_pong(&pong.uri, &ping.uri, &actor.uri, inbox)
                    .await
                {
                    tracing::warn!(inbox, error = %e, "Pong delivery failed");
                }
            }
            None => {
                tracing::warn!(actor_uri = %actor.uri, "Ping sender has no inbox, Pong not sent");
            }
        }

        Ok(())
    }

    /// Undo removes a previously recorded Like or Follow.
    ///
    /// Phase 1 matches the target as a reference to the original activity's
    /// id. Phase 2 runs only when nothing matched and the object was
    /// embedded: the embedded actor must equal the Undo's actor, then the
    /// (actor, object) pair is removed per the embedded type.
    async fn handle_undo(&self, actor: &RemoteActor, target: UndoTarget) -> Result<(), AppError> {
        // Phase 1: undo by the original activity's id.
        if let Some(uri) = &target.reference {
            if self
                .db
                .delete_relation_by_uri(RelationKind::Like, &actor.uri, uri)
                .await?
                || self
                    .db
                    .delete_relation_by_uri(RelationKind::Follow, &actor.uri, uri)
                    .await?
            {
                return Ok(());
            }
        }

        // Phase 2: undo by embedded object. The embedded actor must be
        // present and equal to the authenticated actor before anything is
        // removed.
        if let Some(embedded) = &target.embedded {
            let embedded_actor = match &embedded.actor {
                Some(uri) => uri,
                None => {
                    tracing::info!(actor_uri = %actor.uri, "Undo object carries no actor, nothing removed");
                    return Ok(());
                }
            };
            if *embedded_actor != actor.uri {
                return Err(AppError::Validation(format!(
                    "Undo object actor {} does not match activity actor {}",
                    embedded_actor, actor.uri
                )));
            }

            if let (Some(kind), Some(object_uri)) = (&embedded.kind, &embedded.object) {
                let kind = match kind.as_str() {
                    "Like" => Some(RelationKind::Like),
                    "Follow" => Some(RelationKind::Follow),
                    _ => None,
                };
                if let Some(kind) = kind {
                    if self
                        .db
                        .delete_relation_by_pair(kind, &actor.uri, object_uri)
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
        }

        tracing::info!(actor_uri = %actor.uri, "Undo matched nothing");
        Ok(())
    }

    // =========================================================================
    // Outbound initiation
    // =========================================================================

    /// Originate a Ping to a remote actor.
    ///
    /// Resolves the target's document, refreshes its profile and delivers a
    /// signed Ping to its inbox. Unlike responses to inbound traffic, a
    /// failed delivery here propagates to the caller.
    pub async fn send_ping(&self, target_actor_uri: &str) -> Result<String, AppError> {
        let resolved = key_resolver::resolve_actor(target_actor_uri, &self.http_client).await?;

        let profile = profile_from_document(
            &resolved.actor_uri,
            &resolved.document,
            resolved.inbox.clone(),
        );
        self.db.upsert_profile(&profile).await?;

        let inbox = resolved.inbox.ok_or_else(|| {
            AppError::Federation(format!("Actor {} advertises no inbox", target_actor_uri))
        })?;

        let ping = Ping {
            uri: self.identifiers.generate("ping"),
            actor_uri: self.delivery.actor_uri().to_string(),
            to_uri: target_actor_uri.to_string(),
            created_at: Utc::now(),
        };
        // A freshly minted uri colliding means something is badly wrong;
        // do not deliver a Ping that was never recorded.
        if !self.db.insert_ping(&ping).await? {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Ping {} already recorded",
                ping.uri
            )));
        }

        self.delivery
            .send_ping(&ping.uri, target_actor_uri, &inbox)
            .await?;

        Ok(ping.uri)
    }
}

/// Build a profile shadow from a fetched actor document.
fn profile_from_document(actor_uri: &str, document: &Value, inbox: Option<String>) -> Profile {
    Profile {
        actor_uri: actor_uri.to_string(),
        url: document.get("url").and_then(normalize_reference),
        inbox,
        name: document
            .get("preferredUsername")
            .and_then(Value::as_str)
            .map(str::to_string),
        display_name: document
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        cached_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_ingest() -> (ActivityIngest, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ingest_test.db");
        let db = Arc::new(Database::connect(&db_path).await.unwrap());
        let http_client = Arc::new(reqwest::Client::new());

        let delivery = Arc::new(ActivityDelivery::new(
            http_client.clone(),
            "https://local.example/users/waypost".to_string(),
            "https://local.example/users/waypost#main-key".to_string(),
            "unused in these tests".to_string(),
            Duration::from_secs(1),
        ));

        let ingest = ActivityIngest::new(
            db.clone(),
            http_client,
            IdentifierProvider::new("local.example"),
            delivery,
            true,
        );
        (ingest, db, temp_dir)
    }

    // Actor with no inbox: handlers record state but skip delivery.
    fn remote_actor() -> RemoteActor {
        RemoteActor {
            uri: "https://remote.example/users/bob".to_string(),
            inbox: None,
        }
    }

    fn parsed(value: &Value) -> Activity {
        let activity_type = value["type"].as_str().expect("test activity has a type");
        parse_activity(activity_type, value).expect("test activity should parse")
    }

    async fn apply(ingest: &ActivityIngest, actor: &RemoteActor, value: &Value) -> Result<(), AppError> {
        match parsed(value) {
            Activity::Follow { id, object } => ingest.handle_follow(actor, id, object).await,
            Activity::Like { id, object } => ingest.handle_like(actor, id, object).await,
            Activity::Ping { id, to } => ingest.handle_ping(actor, id, to).await,
            Activity::Undo(target) => ingest.handle_undo(actor, target).await,
            _ => Ok(()),
        }
    }

    #[test]
    fn parse_activity_requires_follow_object() {
        let result = parse_activity("Follow", &json!({"type": "Follow"}));
        assert!(matches!(result, Err(AppError::MalformedActivity(_))));
    }

    #[test]
    fn parse_activity_requires_ping_target() {
        let result = parse_activity("Ping", &json!({"type": "Ping"}));
        assert!(matches!(result, Err(AppError::MalformedActivity(_))));
    }

    #[test]
    fn parse_activity_rejects_undo_with_unusable_object() {
        let result = parse_activity("Undo", &json!({"type": "Undo", "object": 42}));
        assert!(matches!(result, Err(AppError::MalformedActivity(_))));

        let result = parse_activity("Undo", &json!({"type": "Undo"}));
        assert!(matches!(result, Err(AppError::MalformedActivity(_))));
    }

    #[test]
    fn parse_activity_reads_undo_reference_and_embedded_fields() {
        let undo = json!({
            "type": "Undo",
            "object": {
                "id": "https://remote.example/likes/1",
                "type": "Like",
                "actor": "https://remote.example/users/bob",
                "object": "https://local.example/posts/1"
            }
        });

        match parse_activity("Undo", &undo).unwrap() {
            Activity::Undo(target) => {
                assert_eq!(
                    target.reference.as_deref(),
                    Some("https://remote.example/likes/1")
                );
                let embedded = target.embedded.expect("embedded fields");
                assert_eq!(embedded.kind.as_deref(), Some("Like"));
                assert_eq!(
                    embedded.object.as_deref(),
                    Some("https://local.example/posts/1")
                );
            }
            other => panic!("expected Undo, got {:?}", other),
        }
    }

    #[test]
    fn parse_activity_maps_unrecognized_types_to_other() {
        let activity = parse_activity("Shout", &json!({"type": "Shout"})).unwrap();
        assert!(matches!(activity, Activity::Other));
    }

    #[tokio::test]
    async fn follow_is_recorded_once_per_pair() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();
        let activity = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "actor": actor.uri,
            "object": "https://local.example/users/waypost"
        });

        apply(&ingest, &actor, &activity).await.unwrap();
        apply(&ingest, &actor, &activity).await.unwrap();

        assert_eq!(db.count_follows().await.unwrap(), 1);
        let follow = db
            .get_follow(&actor.uri, "https://local.example/users/waypost")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(follow.uri, "https://remote.example/follows/1");
        assert!(follow.accept_uri.starts_with("tag:local.example,"));
    }

    #[tokio::test]
    async fn follow_without_id_gets_local_tag_uri() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();
        let activity = json!({
            "type": "Follow",
            "actor": actor.uri,
            "object": "https://local.example/users/waypost"
        });

        apply(&ingest, &actor, &activity).await.unwrap();

        let follow = db
            .get_follow(&actor.uri, "https://local.example/users/waypost")
            .await
            .unwrap()
            .unwrap();
        assert!(follow.uri.starts_with("tag:local.example,"));
        assert!(follow.uri.contains(":follow/"));
    }

    #[tokio::test]
    async fn like_is_recorded_once_per_pair() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();
        let activity = json!({
            "type": "Like",
            "id": "https://remote.example/likes/1",
            "actor": actor.uri,
            "object": "https://local.example/posts/1"
        });

        apply(&ingest, &actor, &activity).await.unwrap();
        apply(&ingest, &actor, &activity).await.unwrap();

        assert_eq!(db.count_likes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ping_replay_is_suppressed_by_activity_id() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();
        let activity = json!({
            "type": "Ping",
            "id": "https://remote.example/pings/1",
            "actor": actor.uri,
            "to": "https://local.example/users/waypost"
        });

        apply(&ingest, &actor, &activity).await.unwrap();
        apply(&ingest, &actor, &activity).await.unwrap();

        assert_eq!(db.count_pongs().await.unwrap(), 1);
        let pong = db
            .get_pong_for_ping("https://remote.example/pings/1")
            .await
            .unwrap()
            .unwrap();
        assert!(pong.uri.contains(":pong/"));
    }

    #[tokio::test]
    async fn repeated_pings_with_fresh_ids_are_distinct_events() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();

        for id in ["https://remote.example/pings/1", "https://remote.example/pings/2"] {
            let activity = json!({
                "type": "Ping",
                "id": id,
                "actor": actor.uri,
                "to": "https://local.example/users/waypost"
            });
            apply(&ingest, &actor, &activity).await.unwrap();
        }

        assert_eq!(db.count_pongs().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn undo_by_reference_removes_like_then_is_noop() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();

        let like = json!({
            "type": "Like",
            "id": "https://remote.example/likes/1",
            "actor": actor.uri,
            "object": "https://local.example/posts/1"
        });
        apply(&ingest, &actor, &like).await.unwrap();

        let undo = json!({
            "type": "Undo",
            "actor": actor.uri,
            "object": "https://remote.example/likes/1"
        });
        apply(&ingest, &actor, &undo).await.unwrap();
        assert_eq!(db.count_likes().await.unwrap(), 0);

        // Second undo matches nothing and still succeeds.
        apply(&ingest, &actor, &undo).await.unwrap();
    }

    #[tokio::test]
    async fn undo_with_embedded_object_removes_follow_by_pair() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();

        let follow = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "actor": actor.uri,
            "object": "https://local.example/users/waypost"
        });
        apply(&ingest, &actor, &follow).await.unwrap();

        // No id on the embedded object: phase 1 cannot match, phase 2
        // removes by (actor, object) pair.
        let undo = json!({
            "type": "Undo",
            "actor": actor.uri,
            "object": {
                "type": "Follow",
                "actor": actor.uri,
                "object": "https://local.example/users/waypost"
            }
        });
        apply(&ingest, &actor, &undo).await.unwrap();
        assert_eq!(db.count_follows().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undo_with_embedded_object_missing_actor_removes_nothing() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();

        let follow = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "actor": actor.uri,
            "object": "https://local.example/users/waypost"
        });
        apply(&ingest, &actor, &follow).await.unwrap();

        // No id and no actor on the embedded object: neither phase may act.
        let undo = json!({
            "type": "Undo",
            "actor": actor.uri,
            "object": {
                "type": "Follow",
                "object": "https://local.example/users/waypost"
            }
        });
        apply(&ingest, &actor, &undo).await.unwrap();

        assert_eq!(db.count_follows().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn undo_with_spoofed_embedded_actor_is_rejected() {
        let (ingest, db, _temp_dir) = create_test_ingest().await;
        let actor = remote_actor();

        let follow = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "actor": actor.uri,
            "object": "https://local.example/users/waypost"
        });
        apply(&ingest, &actor, &follow).await.unwrap();

        let mallory = RemoteActor {
            uri: "https://remote.example/users/mallory".to_string(),
            inbox: None,
        };
        let undo = json!({
            "type": "Undo",
            "actor": mallory.uri,
            "object": {
                "type": "Follow",
                "actor": actor.uri,
                "object": "https://local.example/users/waypost"
            }
        });

        let result = apply(&ingest, &mallory, &undo).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(db.count_follows().await.unwrap(), 1);
    }

    #[test]
    fn profile_from_document_reads_names_and_url() {
        let document = json!({
            "id": "https://remote.example/users/bob",
            "preferredUsername": "bob",
            "name": "Bob",
            "url": "https://remote.example/@bob"
        });

        let profile = profile_from_document(
            "https://remote.example/users/bob",
            &document,
            Some("https://remote.example/users/bob/inbox".to_string()),
        );

        assert_eq!(profile.name.as_deref(), Some("bob"));
        assert_eq!(profile.display_name.as_deref(), Some("Bob"));
        assert_eq!(profile.url.as_deref(), Some("https://remote.example/@bob"));
        assert_eq!(
            profile.inbox.as_deref(),
            Some("https://remote.example/users/bob/inbox")
        );
    }
}
