//! SQLite database operations
//!
//! All database access goes through this module.
//! The store is the only serialization point between concurrent requests;
//! the UNIQUE constraints on follows/likes back the idempotency invariant.

use std::path::Path;

use sqlx::{Pool, Sqlite, SqlitePool};

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Which relation kind an undo targets.
///
/// Likes and Follows are undone with an identical lookup-then-delete shape,
/// parameterized only by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Like,
    Follow,
}

impl RelationKind {
    fn table(self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Follow => "follows",
        }
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Local actor
    // =========================================================================

    /// Get the local actor identity, if one has been created.
    pub async fn get_local_actor(&self) -> Result<Option<LocalActor>, AppError> {
        let actor = sqlx::query_as::<_, LocalActor>("SELECT * FROM local_actor LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(actor)
    }

    /// Insert the local actor identity.
    pub async fn insert_local_actor(&self, actor: &LocalActor) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO local_actor (id, username, display_name, private_key_pem, public_key_pem, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&actor.id)
        .bind(&actor.username)
        .bind(&actor.display_name)
        .bind(&actor.private_key_pem)
        .bind(&actor.public_key_pem)
        .bind(actor.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Upsert a remote actor shadow record.
    ///
    /// Last writer wins; concurrent upserts for the same actor converge.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO profiles (actor_uri, url, inbox, name, display_name, cached_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(actor_uri) DO UPDATE SET
                 url = excluded.url,
                 inbox = excluded.inbox,
                 name = excluded.name,
                 display_name = excluded.display_name,
                 cached_at = excluded.cached_at",
        )
        .bind(&profile.actor_uri)
        .bind(&profile.url)
        .bind(&profile.inbox)
        .bind(&profile.name)
        .bind(&profile.display_name)
        .bind(profile.cached_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a profile by actor URI.
    pub async fn get_profile(&self, actor_uri: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE actor_uri = ?")
            .bind(actor_uri)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Check whether a Follow exists for the (actor, object) pair.
    pub async fn follow_exists(&self, actor_uri: &str, object_uri: &str) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follows WHERE actor_uri = ? AND object_uri = ?",
        )
        .bind(actor_uri)
        .bind(object_uri)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert a Follow.
    ///
    /// Returns false if the (actor, object) pair already exists — a lost
    /// race against a concurrent duplicate is folded into the same outcome
    /// as a pre-check hit.
    pub async fn insert_follow(&self, follow: &Follow) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO follows (uri, accept_uri, actor_uri, object_uri, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&follow.uri)
        .bind(&follow.accept_uri)
        .bind(&follow.actor_uri)
        .bind(&follow.object_uri)
        .bind(follow.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(error) if is_unique_violation(&error) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Get a Follow by (actor, object) pair.
    pub async fn get_follow(
        &self,
        actor_uri: &str,
        object_uri: &str,
    ) -> Result<Option<Follow>, AppError> {
        let follow = sqlx::query_as::<_, Follow>(
            "SELECT * FROM follows WHERE actor_uri = ? AND object_uri = ?",
        )
        .bind(actor_uri)
        .bind(object_uri)
        .fetch_optional(&self.pool)
        .await?;
        Ok(follow)
    }

    /// Count all Follow rows.
    pub async fn count_follows(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// Check whether a Like exists for the (actor, object) pair.
    pub async fn like_exists(&self, actor_uri: &str, object_uri: &str) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM likes WHERE actor_uri = ? AND object_uri = ?",
        )
        .bind(actor_uri)
        .bind(object_uri)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert a Like. Returns false on a duplicate (actor, object) pair.
    pub async fn insert_like(&self, like: &Like) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO likes (uri, actor_uri, object_uri, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&like.uri)
        .bind(&like.actor_uri)
        .bind(&like.object_uri)
        .bind(like.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(error) if is_unique_violation(&error) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Count all Like rows.
    pub async fn count_likes(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Undo deletes
    // =========================================================================

    /// Delete a relation by (actor_uri, uri): "undo by referencing the
    /// original activity's id". Returns true if a row was removed.
    pub async fn delete_relation_by_uri(
        &self,
        kind: RelationKind,
        actor_uri: &str,
        uri: &str,
    ) -> Result<bool, AppError> {
        let sql = match kind {
            RelationKind::Like => "DELETE FROM likes WHERE actor_uri = ? AND uri = ?",
            RelationKind::Follow => "DELETE FROM follows WHERE actor_uri = ? AND uri = ?",
        };
        let result = sqlx::query(sql)
            .bind(actor_uri)
            .bind(uri)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(
                table = kind.table(),
                actor_uri,
                uri,
                "Relation removed by activity URI"
            );
        }
        Ok(removed)
    }

    /// Delete a relation by (actor_uri, object_uri), for undos carrying an
    /// embedded object. Returns true if a row was removed.
    pub async fn delete_relation_by_pair(
        &self,
        kind: RelationKind,
        actor_uri: &str,
        object_uri: &str,
    ) -> Result<bool, AppError> {
        let sql = match kind {
            RelationKind::Like => "DELETE FROM likes WHERE actor_uri = ? AND object_uri = ?",
            RelationKind::Follow => "DELETE FROM follows WHERE actor_uri = ? AND object_uri = ?",
        };
        let result = sqlx::query(sql)
            .bind(actor_uri)
            .bind(object_uri)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(
                table = kind.table(),
                actor_uri,
                object_uri,
                "Relation removed by (actor, object) pair"
            );
        }
        Ok(removed)
    }

    // =========================================================================
    // Pings / Pongs
    // =========================================================================

    /// Check whether a Ping with this exact activity URI exists.
    pub async fn ping_exists(&self, uri: &str) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pings WHERE uri = ?")
            .bind(uri)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Insert a locally originated Ping (no paired Pong).
    pub async fn insert_ping(&self, ping: &Ping) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO pings (uri, actor_uri, to_uri, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&ping.uri)
        .bind(&ping.actor_uri)
        .bind(&ping.to_uri)
        .bind(ping.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(error) if is_unique_violation(&error) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Insert a received Ping together with its linked Pong in one
    /// transaction. Returns false if the Ping URI already exists (either
    /// pre-checked or lost to a concurrent duplicate), in which case no
    /// Pong is created either.
    pub async fn insert_ping_with_pong(&self, ping: &Ping, pong: &Pong) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO pings (uri, actor_uri, to_uri, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&ping.uri)
        .bind(&ping.actor_uri)
        .bind(&ping.to_uri)
        .bind(ping.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(error) if is_unique_violation(&error) => {
                tx.rollback().await?;
                return Ok(false);
            }
            Err(error) => return Err(error.into()),
        }

        sqlx::query("INSERT INTO pongs (uri, ping_uri, created_at) VALUES (?, ?, ?)")
            .bind(&pong.uri)
            .bind(&pong.ping_uri)
            .bind(pong.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Get the Pong linked to a Ping, if any.
    pub async fn get_pong_for_ping(&self, ping_uri: &str) -> Result<Option<Pong>, AppError> {
        let pong = sqlx::query_as::<_, Pong>("SELECT * FROM pongs WHERE ping_uri = ?")
            .bind(ping_uri)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pong)
    }

    /// Count all Pong rows.
    pub async fn count_pongs(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pongs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("database_test.db");
        let db = Database::connect(&db_path).await.unwrap();
        (db, temp_dir)
    }

    fn sample_follow(uri: &str) -> Follow {
        Follow {
            uri: uri.to_string(),
            accept_uri: "tag:local.example,2026:accept/follow/01A".to_string(),
            actor_uri: "https://remote.example/users/bob".to_string(),
            object_uri: "https://local.example/users/alice".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_follow_reports_duplicate_pair_as_existing() {
        let (db, _temp_dir) = create_test_db().await;

        let first = sample_follow("https://remote.example/follows/1");
        assert!(db.insert_follow(&first).await.unwrap());

        // Same (actor, object) pair under a different activity URI.
        let second = sample_follow("https://remote.example/follows/2");
        assert!(!db.insert_follow(&second).await.unwrap());

        assert_eq!(db.count_follows().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_like_reports_duplicate_pair_as_existing() {
        let (db, _temp_dir) = create_test_db().await;

        let like = Like {
            uri: "https://remote.example/likes/1".to_string(),
            actor_uri: "https://remote.example/users/bob".to_string(),
            object_uri: "https://local.example/posts/1".to_string(),
            created_at: Utc::now(),
        };
        assert!(db.insert_like(&like).await.unwrap());

        let duplicate = Like {
            uri: "https://remote.example/likes/2".to_string(),
            ..like.clone()
        };
        assert!(!db.insert_like(&duplicate).await.unwrap());
        assert_eq!(db.count_likes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_ping_with_pong_is_transactional_on_duplicate() {
        let (db, _temp_dir) = create_test_db().await;

        let ping = Ping {
            uri: "https://remote.example/pings/1".to_string(),
            actor_uri: "https://remote.example/users/bob".to_string(),
            to_uri: "https://local.example/users/alice".to_string(),
            created_at: Utc::now(),
        };
        let pong = Pong {
            uri: "tag:local.example,2026:pong/01B".to_string(),
            ping_uri: ping.uri.clone(),
            created_at: Utc::now(),
        };
        assert!(db.insert_ping_with_pong(&ping, &pong).await.unwrap());

        let second_pong = Pong {
            uri: "tag:local.example,2026:pong/01C".to_string(),
            ping_uri: ping.uri.clone(),
            created_at: Utc::now(),
        };
        assert!(!db.insert_ping_with_pong(&ping, &second_pong).await.unwrap());

        assert_eq!(db.count_pongs().await.unwrap(), 1);
        let linked = db.get_pong_for_ping(&ping.uri).await.unwrap().unwrap();
        assert_eq!(linked.uri, pong.uri);
    }

    #[tokio::test]
    async fn insert_ping_reports_duplicate_uri_as_existing() {
        let (db, _temp_dir) = create_test_db().await;

        let ping = Ping {
            uri: "tag:local.example,2026:ping/01A".to_string(),
            actor_uri: "https://local.example/users/alice".to_string(),
            to_uri: "https://remote.example/users/bob".to_string(),
            created_at: Utc::now(),
        };
        assert!(db.insert_ping(&ping).await.unwrap());
        assert!(!db.insert_ping(&ping).await.unwrap());
    }

    #[tokio::test]
    async fn delete_relation_by_uri_removes_only_matching_actor() {
        let (db, _temp_dir) = create_test_db().await;

        let like = Like {
            uri: "https://remote.example/likes/1".to_string(),
            actor_uri: "https://remote.example/users/bob".to_string(),
            object_uri: "https://local.example/posts/1".to_string(),
            created_at: Utc::now(),
        };
        db.insert_like(&like).await.unwrap();

        // Wrong actor: nothing removed.
        let removed = db
            .delete_relation_by_uri(
                RelationKind::Like,
                "https://remote.example/users/mallory",
                &like.uri,
            )
            .await
            .unwrap();
        assert!(!removed);
        assert_eq!(db.count_likes().await.unwrap(), 1);

        let removed = db
            .delete_relation_by_uri(RelationKind::Like, &like.actor_uri, &like.uri)
            .await
            .unwrap();
        assert!(removed);
        assert_eq!(db.count_likes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_profile_converges_to_last_writer() {
        let (db, _temp_dir) = create_test_db().await;
        let actor_uri = "https://remote.example/users/bob";

        let first = Profile {
            actor_uri: actor_uri.to_string(),
            url: Some("https://remote.example/@bob".to_string()),
            inbox: Some("https://remote.example/users/bob/inbox".to_string()),
            name: Some("bob".to_string()),
            display_name: Some("Bob".to_string()),
            cached_at: Utc::now(),
        };
        db.upsert_profile(&first).await.unwrap();

        let second = Profile {
            display_name: Some("Bob Renamed".to_string()),
            ..first.clone()
        };
        db.upsert_profile(&second).await.unwrap();

        let stored = db.get_profile(actor_uri).await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Bob Renamed"));
    }
}
