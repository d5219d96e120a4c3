//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All statements share one
//! connection; multi-statement writes run in a transaction guarded by a
//! write lock so concurrent tasks never interleave inside it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::posts::model::{MediaItem, MediaKind, NewPost, Post};
use crate::store::migrations;
use crate::store::traits::{Channel, ChannelRole, Database};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map an insert/update failure, keeping uniqueness violations distinguishable.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") || message.contains("CHECK constraint failed")
    {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

const CHANNEL_COLUMNS: &str = "id, chat_id, role, title, is_active";

const POST_COLUMNS: &str =
    "id, source_chat_id, source_message_id, media_group_id, original_text, rewritten_text, created_at";

/// Column order matches CHANNEL_COLUMNS.
fn row_to_channel(row: &libsql::Row) -> Result<Channel, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("channel row parse: {e}"));
    let role_str: String = row.get(2).map_err(parse)?;
    Ok(Channel {
        id: row.get(0).map_err(parse)?,
        chat_id: row.get(1).map_err(parse)?,
        role: role_str.parse().map_err(DatabaseError::Query)?,
        title: row.get(3).map_err(parse)?,
        is_active: row.get::<i64>(4).map_err(parse)? != 0,
    })
}

/// Column order matches POST_COLUMNS.
fn row_to_post(row: &libsql::Row) -> Result<Post, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("post row parse: {e}"));
    let created_str: String = row.get(6).map_err(parse)?;
    Ok(Post {
        id: row.get(0).map_err(parse)?,
        source_chat_id: row.get(1).map_err(parse)?,
        source_message_id: row.get(2).map_err(parse)?,
        media_group_id: row.get::<Option<String>>(3).map_err(parse)?,
        original_text: row.get(4).map_err(parse)?,
        rewritten_text: row.get::<Option<String>>(5).map_err(parse)?,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_media_item(row: &libsql::Row) -> Result<MediaItem, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("media row parse: {e}"));
    let kind_str: String = row.get(2).map_err(parse)?;
    Ok(MediaItem {
        id: row.get(0).map_err(parse)?,
        post_id: row.get(1).map_err(parse)?,
        kind: kind_str.parse::<MediaKind>().map_err(DatabaseError::Query)?,
        message_id: row.get(3).map_err(parse)?,
        file_id: row.get::<Option<String>>(4).map_err(parse)?,
        sort_index: row.get(5).map_err(parse)?,
    })
}

impl LibSqlBackend {
    async fn query_channels(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Channel>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut channels = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => channels.push(row_to_channel(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
            }
        }
        Ok(channels)
    }

    async fn require_channel(&self, op: &str, id: i64) -> Result<Channel, DatabaseError> {
        self.get_channel(id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "channel".into(),
            id: format!("{id} ({op})"),
        })
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Channels ────────────────────────────────────────────────────

    async fn insert_channel(
        &self,
        chat_id: i64,
        role: ChannelRole,
        title: &str,
    ) -> Result<Channel, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO channels (chat_id, role, title, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
                params![chat_id, role.as_str(), title, now],
            )
            .await
            .map_err(|e| write_error("insert_channel", e))?;
        let id = self.conn().last_insert_rowid();
        drop(_guard);

        debug!(channel_id = id, chat_id, role = %role, "Channel inserted");
        self.require_channel("insert_channel", id).await
    }

    async fn get_channel(&self, id: i64) -> Result<Option<Channel>, DatabaseError> {
        let channels = self
            .query_channels(
                "get_channel",
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                params![id],
            )
            .await?;
        Ok(channels.into_iter().next())
    }

    async fn get_channel_by_chat_id(&self, chat_id: i64) -> Result<Option<Channel>, DatabaseError> {
        let channels = self
            .query_channels(
                "get_channel_by_chat_id",
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE chat_id = ?1"),
                params![chat_id],
            )
            .await?;
        Ok(channels.into_iter().next())
    }

    async fn list_channels(&self, role: ChannelRole) -> Result<Vec<Channel>, DatabaseError> {
        self.query_channels(
            "list_channels",
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE role = ?1 ORDER BY id ASC"),
            params![role.as_str()],
        )
        .await
    }

    async fn list_active_sources(&self) -> Result<Vec<Channel>, DatabaseError> {
        self.query_channels(
            "list_active_sources",
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE role = 'source' AND is_active = 1 ORDER BY id ASC"
            ),
            (),
        )
        .await
    }

    async fn active_target(&self) -> Result<Option<Channel>, DatabaseError> {
        let channels = self
            .query_channels(
                "active_target",
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE role = 'target' AND is_active = 1 ORDER BY id ASC LIMIT 1"
                ),
                (),
            )
            .await?;
        Ok(channels.into_iter().next())
    }

    async fn replace_target(&self, chat_id: i64, title: &str) -> Result<Channel, DatabaseError> {
        if let Some(existing) = self.get_channel_by_chat_id(chat_id).await? {
            if existing.role == ChannelRole::Source {
                return Err(DatabaseError::Constraint(format!(
                    "replace_target: chat {chat_id} is registered as a source"
                )));
            }
        }

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_target begin: {e}")))?;

        let removed = tx
            .execute("DELETE FROM channels WHERE role = 'target'", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_target delete: {e}")))?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO channels (chat_id, role, title, is_active, created_at) VALUES (?1, 'target', ?2, 1, ?3)",
            params![chat_id, title, now],
        )
        .await
        .map_err(|e| write_error("replace_target insert", e))?;
        let id = tx.last_insert_rowid();

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_target commit: {e}")))?;
        drop(_guard);

        info!(chat_id, replaced = removed, "Target channel set");
        self.require_channel("replace_target", id).await
    }

    async fn set_channel_active(&self, id: i64, active: bool) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "UPDATE channels SET is_active = ?1 WHERE id = ?2",
                params![active as i64, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_channel_active: {e}")))?;
        Ok(count > 0)
    }

    async fn rename_channel(&self, id: i64, title: &str) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "UPDATE channels SET title = ?1 WHERE id = ?2",
                params![title, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("rename_channel: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_channel(&self, id: i64) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute("DELETE FROM channels WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_channel: {e}")))?;
        Ok(count > 0)
    }

    // ── Posts ───────────────────────────────────────────────────────

    async fn insert_post(&self, post: &NewPost) -> Result<Option<i64>, DatabaseError> {
        let mut media = post.media.clone();
        media.sort_by_key(|m| m.message_id);
        media.dedup_by_key(|m| m.message_id);

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_post begin: {e}")))?;

        let now = Utc::now().to_rfc3339();
        let mut rows = tx
            .query(
                "INSERT INTO posts (source_chat_id, source_message_id, media_group_id, original_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (source_chat_id, media_group_id) DO NOTHING
                 RETURNING id",
                params![
                    post.source_chat_id,
                    post.source_message_id,
                    opt_text(post.media_group_id.as_deref()),
                    post.original_text.as_str(),
                    now,
                ],
            )
            .await
            .map_err(|e| write_error("insert_post", e))?;

        let post_id = match rows.next().await {
            Ok(Some(row)) => Some(
                row.get::<i64>(0)
                    .map_err(|e| DatabaseError::Query(format!("insert_post id: {e}")))?,
            ),
            Ok(None) => None,
            Err(e) => return Err(DatabaseError::Query(format!("insert_post: {e}"))),
        };
        drop(rows);

        let Some(post_id) = post_id else {
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::Query(format!("insert_post rollback: {e}")))?;
            debug!(
                chat_id = post.source_chat_id,
                media_group_id = ?post.media_group_id,
                "Duplicate album ignored"
            );
            return Ok(None);
        };

        for (index, item) in media.iter().enumerate() {
            tx.execute(
                "INSERT INTO media_items (post_id, kind, message_id, file_id, sort_index) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    post_id,
                    item.kind.as_str(),
                    item.message_id,
                    opt_text(item.file_id.as_deref()),
                    index as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_post media: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_post commit: {e}")))?;

        debug!(post_id, media = media.len(), "Post inserted into DB");
        Ok(Some(post_id))
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_post: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_post(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_post: {e}"))),
        }
    }

    async fn list_media_items(&self, post_id: i64) -> Result<Vec<MediaItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, post_id, kind, message_id, file_id, sort_index FROM media_items WHERE post_id = ?1 ORDER BY sort_index ASC",
                params![post_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_media_items: {e}")))?;

        let mut items = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => items.push(row_to_media_item(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_media_items: {e}"))),
            }
        }
        Ok(items)
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_posts: {e}")))?;

        let mut posts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_post(&row) {
                Ok(post) => posts.push(post),
                Err(e) => tracing::warn!("Skipping post row: {e}"),
            }
        }
        Ok(posts)
    }

    async fn set_rewritten_text(&self, id: i64, text: Option<&str>) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "UPDATE posts SET rewritten_text = ?1 WHERE id = ?2",
                params![opt_text(text), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_rewritten_text: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_post begin: {e}")))?;

        // Explicit so the cascade does not depend on the foreign_keys pragma.
        tx.execute("DELETE FROM media_items WHERE post_id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_post media: {e}")))?;
        let count = tx
            .execute("DELETE FROM posts WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_post: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_post commit: {e}")))?;

        debug!(post_id = id, deleted = count > 0, "Post deleted from DB");
        Ok(count > 0)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| DatabaseError::Query(format!("get_setting row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;
        Ok(())
    }

    async fn delete_settings(&self, keys: &[&str]) -> Result<usize, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let mut deleted = 0;
        for key in keys {
            deleted += self
                .conn()
                .execute("DELETE FROM settings WHERE key = ?1", params![*key])
                .await
                .map_err(|e| DatabaseError::Query(format!("delete_settings: {e}")))?;
        }
        Ok(deleted as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::model::NewMediaItem;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn album(chat_id: i64, group: &str, ids: &[i64]) -> NewPost {
        NewPost {
            source_chat_id: chat_id,
            source_message_id: ids.iter().copied().min().unwrap_or(0),
            media_group_id: Some(group.to_string()),
            original_text: "caption".into(),
            media: ids
                .iter()
                .map(|&message_id| NewMediaItem {
                    kind: MediaKind::Photo,
                    message_id,
                    file_id: Some(format!("file-{message_id}")),
                })
                .collect(),
        }
    }

    // ── Channel tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_lookup_channel() {
        let db = test_db().await;
        let ch = db
            .insert_channel(-1001, ChannelRole::Source, "News")
            .await
            .unwrap();
        assert!(ch.is_active);
        assert_eq!(ch.role, ChannelRole::Source);

        let by_chat = db.get_channel_by_chat_id(-1001).await.unwrap().unwrap();
        assert_eq!(by_chat, ch);
        assert!(db.get_channel(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_chat_id_is_a_constraint_error() {
        let db = test_db().await;
        db.insert_channel(-1001, ChannelRole::Source, "A").await.unwrap();
        let err = db
            .insert_channel(-1001, ChannelRole::Source, "B")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn active_sources_skip_disabled() {
        let db = test_db().await;
        let a = db.insert_channel(-1001, ChannelRole::Source, "A").await.unwrap();
        db.insert_channel(-1002, ChannelRole::Source, "B").await.unwrap();
        assert!(db.set_channel_active(a.id, false).await.unwrap());

        let active = db.list_active_sources().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].chat_id, -1002);
        assert_eq!(db.list_channels(ChannelRole::Source).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn replace_target_keeps_one() {
        let db = test_db().await;
        db.replace_target(-2001, "Old").await.unwrap();
        let new = db.replace_target(-2002, "New").await.unwrap();

        let targets = db.list_channels(ChannelRole::Target).await.unwrap();
        assert_eq!(targets, vec![new.clone()]);
        assert_eq!(db.active_target().await.unwrap(), Some(new));
    }

    #[tokio::test]
    async fn replace_target_rejects_a_source() {
        let db = test_db().await;
        db.insert_channel(-1001, ChannelRole::Source, "Src").await.unwrap();
        let err = db.replace_target(-1001, "Src").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
        assert!(db.active_target().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_and_delete_channel() {
        let db = test_db().await;
        let ch = db.insert_channel(-1001, ChannelRole::Source, "A").await.unwrap();
        assert!(db.rename_channel(ch.id, "Renamed").await.unwrap());
        assert_eq!(db.get_channel(ch.id).await.unwrap().unwrap().title, "Renamed");
        assert!(db.delete_channel(ch.id).await.unwrap());
        assert!(!db.delete_channel(ch.id).await.unwrap());
    }

    // ── Post tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_post_orders_media_by_message_id() {
        let db = test_db().await;
        let id = db
            .insert_post(&album(-1001, "g1", &[12, 10, 11]))
            .await
            .unwrap()
            .unwrap();

        let items = db.list_media_items(id).await.unwrap();
        let ids: Vec<i64> = items.iter().map(|m| m.message_id).collect();
        let order: Vec<i64> = items.iter().map(|m| m.sort_index).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(items[0].file_id.as_deref(), Some("file-10"));

        let post = db.get_post(id).await.unwrap().unwrap();
        assert_eq!(post.source_message_id, 10);
        assert!(post.rewritten_text.is_none());
    }

    #[tokio::test]
    async fn duplicate_album_is_ignored() {
        let db = test_db().await;
        assert!(db.insert_post(&album(-1001, "g1", &[1, 2])).await.unwrap().is_some());
        assert!(db.insert_post(&album(-1001, "g1", &[1, 2])).await.unwrap().is_none());
        assert_eq!(db.list_posts(10).await.unwrap().len(), 1);

        // Same group id from another chat is a different album.
        assert!(db.insert_post(&album(-1002, "g1", &[1])).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn single_posts_never_conflict() {
        let db = test_db().await;
        let single = NewPost {
            source_chat_id: -1001,
            source_message_id: 5,
            media_group_id: None,
            original_text: "text".into(),
            media: vec![],
        };
        assert!(db.insert_post(&single).await.unwrap().is_some());
        assert!(db.insert_post(&single).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rewritten_text_set_and_cleared() {
        let db = test_db().await;
        let id = db.insert_post(&album(-1001, "g", &[1])).await.unwrap().unwrap();

        assert!(db.set_rewritten_text(id, Some("new")).await.unwrap());
        assert_eq!(
            db.get_post(id).await.unwrap().unwrap().rewritten_text.as_deref(),
            Some("new")
        );
        assert!(db.set_rewritten_text(id, None).await.unwrap());
        assert!(db.get_post(id).await.unwrap().unwrap().rewritten_text.is_none());
        assert!(!db.set_rewritten_text(999, Some("x")).await.unwrap());
    }

    #[tokio::test]
    async fn delete_post_cascades_media() {
        let db = test_db().await;
        let id = db.insert_post(&album(-1001, "g", &[1, 2])).await.unwrap().unwrap();
        assert!(db.delete_post(id).await.unwrap());
        assert!(db.get_post(id).await.unwrap().is_none());
        assert!(db.list_media_items(id).await.unwrap().is_empty());
        assert!(!db.delete_post(id).await.unwrap());
    }

    // ── Settings tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn settings_upsert_and_delete() {
        let db = test_db().await;
        assert!(db.get_setting("model").await.unwrap().is_none());
        db.set_setting("model", "a").await.unwrap();
        db.set_setting("model", "b").await.unwrap();
        assert_eq!(db.get_setting("model").await.unwrap().as_deref(), Some("b"));

        db.set_setting("prompt_std", "p").await.unwrap();
        let deleted = db.delete_settings(&["model", "prompt_std", "nope"]).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(db.get_setting("model").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.set_setting("model", "kept").await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.get_setting("model").await.unwrap().as_deref(), Some("kept"));
    }
}
