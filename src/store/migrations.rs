//! Schema migrations for the relay database.
//!
//! Applied versions are recorded in `_migrations`; startup applies whatever
//! is newer, in order.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only. Versions must stay strictly increasing.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL UNIQUE,
                role TEXT NOT NULL CHECK (role IN ('source', 'target')),
                title TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_channels_role ON channels(role, is_active);

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_chat_id INTEGER NOT NULL,
                source_message_id INTEGER NOT NULL,
                media_group_id TEXT,
                original_text TEXT NOT NULL DEFAULT '',
                rewritten_text TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (source_chat_id, media_group_id)
            );
            CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at);

            CREATE TABLE IF NOT EXISTS media_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                message_id INTEGER NOT NULL,
                sort_index INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_items_post ON media_items(post_id, sort_index);
        "#,
    },
    Migration {
        version: 2,
        name: "settings",
        sql: r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 3,
        name: "media_file_ids",
        sql: r#"
            ALTER TABLE media_items ADD COLUMN file_id TEXT;
        "#,
    },
];

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
         );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("bootstrap: {e}")))?;

    let applied = applied_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        tracing::info!(version = migration.version, name = migration.name, "Migrating schema");
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name)))?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("record V{}: {e}", migration.version)))?;
    }
    Ok(())
}

async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn migrated() -> Connection {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        run_migrations(&conn).await.unwrap();
        conn
    }

    async fn count(conn: &Connection, sql: &str) -> i64 {
        let mut rows = conn.query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let conn = migrated().await;
        run_migrations(&conn).await.unwrap();
        assert_eq!(applied_version(&conn).await.unwrap(), MIGRATIONS.len() as i64);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM _migrations").await,
            MIGRATIONS.len() as i64
        );
    }

    #[tokio::test]
    async fn upgrade_keeps_media_rows_without_file_ids() {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute_batch(
            "CREATE TABLE _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
             );",
        )
        .await
        .unwrap();
        for migration in &MIGRATIONS[..2] {
            conn.execute_batch(migration.sql).await.unwrap();
            conn.execute(
                "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
                libsql::params![migration.version, migration.name],
            )
            .await
            .unwrap();
        }
        conn.execute(
            "INSERT INTO posts (id, source_chat_id, source_message_id, created_at)
             VALUES (1, -1001, 5, '2024-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO media_items (post_id, kind, message_id, sort_index) VALUES (1, 'photo', 5, 0)",
            (),
        )
        .await
        .unwrap();

        run_migrations(&conn).await.unwrap();

        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM media_items WHERE file_id IS NULL").await,
            1
        );
    }

    #[tokio::test]
    async fn album_is_unique_per_source_but_single_posts_are_not() {
        let conn = migrated().await;
        let insert = "INSERT INTO posts (source_chat_id, source_message_id, media_group_id, created_at)
                      VALUES (-1001, ?1, ?2, '2024-01-01T00:00:00Z')";
        conn.execute(insert, libsql::params![1, "g1"]).await.unwrap();
        assert!(conn.execute(insert, libsql::params![2, "g1"]).await.is_err());

        conn.execute(insert, libsql::params![3, libsql::Value::Null]).await.unwrap();
        conn.execute(insert, libsql::params![4, libsql::Value::Null]).await.unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM posts").await, 3);
    }

    #[tokio::test]
    async fn deleting_a_post_drops_its_media() {
        let conn = migrated().await;
        conn.execute(
            "INSERT INTO posts (id, source_chat_id, source_message_id, created_at)
             VALUES (1, -1001, 5, '2024-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO media_items (post_id, kind, message_id, sort_index) VALUES (1, 'photo', 5, 0)",
            (),
        )
        .await
        .unwrap();

        conn.execute("DELETE FROM posts WHERE id = 1", ()).await.unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM media_items").await, 0);
    }
}
