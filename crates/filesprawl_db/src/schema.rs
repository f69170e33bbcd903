//! Catalog schema creation.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::CatalogDb;
use tracing::debug;

impl CatalogDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        // Remotes: backends referenced by name, created on first scan
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS remotes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Content hashes: one row per (value, type), never deleted
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS content_hashes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash_value TEXT NOT NULL,
                hash_type TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(hash_value, hash_type)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Catalog objects: one row per (remote, path)
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catalog_objects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id INTEGER NOT NULL REFERENCES remotes(id),
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                is_dir INTEGER NOT NULL,
                mime_type TEXT,
                mod_time INTEGER,
                remote_object_id TEXT,
                metadata TEXT,
                first_seen_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                UNIQUE(remote_id, path)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Scan events: append-only observation history
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS scan_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                object_id INTEGER NOT NULL REFERENCES catalog_objects(id),
                hash_id INTEGER REFERENCES content_hashes(id),
                remote_id INTEGER NOT NULL REFERENCES remotes(id),
                run_id TEXT NOT NULL,
                observed_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_object ON scan_events(object_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_hash ON scan_events(hash_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_run ON scan_events(run_id)")
            .execute(&self.pool)
            .await?;

        debug!("Catalog schema verified");
        Ok(())
    }
}
