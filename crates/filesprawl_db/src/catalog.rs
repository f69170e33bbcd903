//! Catalog writes: remotes, objects and scan events.

use crate::error::Result;
use crate::types::*;
use crate::CatalogDb;
use filesprawl_ids::{EventId, HashId, ObjectId, RemoteId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

/// Object attributes a re-scan may overwrite.
#[derive(Debug, PartialEq)]
struct ObjectAttributes {
    name: String,
    size: i64,
    is_dir: bool,
    mime_type: Option<String>,
    mod_time: Option<i64>,
    remote_object_id: Option<String>,
    metadata: Option<String>,
}

impl ObjectAttributes {
    fn from_descriptor(descriptor: &ObjectDescriptor) -> Result<Self> {
        let name = if descriptor.name.is_empty() {
            ObjectDescriptor::base_name(&descriptor.path).to_string()
        } else {
            descriptor.name.clone()
        };
        let metadata = descriptor
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            name,
            size: descriptor.size,
            is_dir: descriptor.is_dir,
            mime_type: descriptor.mime_type.clone(),
            mod_time: descriptor.mod_time.map(|t| t.timestamp_millis()),
            remote_object_id: descriptor.id.clone(),
            metadata,
        })
    }

    fn from_row(row: &SqliteRow) -> Self {
        Self {
            name: row.get("name"),
            size: row.get("size"),
            is_dir: row.get("is_dir"),
            mime_type: row.get("mime_type"),
            mod_time: row.get("mod_time"),
            remote_object_id: row.get("remote_object_id"),
            metadata: row.get("metadata"),
        }
    }
}

impl CatalogDb {
    /// Upsert a remote by name and return its id.
    pub async fn upsert_remote(&self, name: &str) -> Result<RemoteId> {
        validate_remote_name(name)?;

        let id: i64 = sqlx::query_scalar(UPSERT_REMOTE)
            .bind(name)
            .bind(Self::now_millis())
            .fetch_one(&self.pool)
            .await?;
        Ok(RemoteId::new(id))
    }

    /// Record one observed descriptor.
    ///
    /// Upserts the remote, upserts the object keyed by (remote, path) and
    /// appends a scan event, all in one transaction. `hash_id` is `None` for
    /// directories and unhashed files.
    pub async fn record(
        &self,
        remote: &str,
        descriptor: &ObjectDescriptor,
        hash_id: Option<HashId>,
        stamp: &ScanStamp,
    ) -> Result<RecordOutcome> {
        validate_remote_name(remote)?;
        descriptor.validate()?;
        let attrs = ObjectAttributes::from_descriptor(descriptor)?;
        let seen_at = stamp.observed_at.timestamp_millis();

        let mut tx = self.pool.begin().await?;

        // First statement writes, so the transaction takes the write lock
        // up front instead of upgrading from a read.
        let remote_id: i64 = sqlx::query_scalar(UPSERT_REMOTE)
            .bind(remote)
            .bind(Self::now_millis())
            .fetch_one(&mut *tx)
            .await?;

        let existing = sqlx::query(
            r#"
            SELECT name, size, is_dir, mime_type, mod_time, remote_object_id, metadata
            FROM catalog_objects
            WHERE remote_id = ? AND path = ?
            "#,
        )
        .bind(remote_id)
        .bind(&descriptor.path)
        .fetch_optional(&mut *tx)
        .await?;

        let change = match existing {
            None => ObjectChange::Created,
            Some(row) if ObjectAttributes::from_row(&row) == attrs => ObjectChange::Unchanged,
            Some(_) => ObjectChange::Updated,
        };

        let object_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO catalog_objects (
                remote_id, path, name, size, is_dir, mime_type, mod_time,
                remote_object_id, metadata, first_seen_at, last_seen_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(remote_id, path) DO UPDATE SET
                name = excluded.name,
                size = excluded.size,
                is_dir = excluded.is_dir,
                mime_type = excluded.mime_type,
                mod_time = excluded.mod_time,
                remote_object_id = excluded.remote_object_id,
                metadata = excluded.metadata,
                last_seen_at = MAX(catalog_objects.last_seen_at, excluded.last_seen_at)
            RETURNING id
            "#,
        )
        .bind(remote_id)
        .bind(&descriptor.path)
        .bind(&attrs.name)
        .bind(attrs.size)
        .bind(attrs.is_dir)
        .bind(&attrs.mime_type)
        .bind(attrs.mod_time)
        .bind(&attrs.remote_object_id)
        .bind(&attrs.metadata)
        .bind(seen_at)
        .bind(seen_at)
        .fetch_one(&mut *tx)
        .await?;

        let event_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scan_events (object_id, hash_id, remote_id, run_id, observed_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(object_id)
        .bind(hash_id.map(HashId::get))
        .bind(remote_id)
        .bind(stamp.run_id.as_str())
        .bind(seen_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            remote,
            path = %descriptor.path,
            object_id,
            event_id,
            change = %change,
            "Recorded object"
        );

        Ok(RecordOutcome {
            remote_id: RemoteId::new(remote_id),
            object_id: ObjectId::new(object_id),
            event_id: EventId::new(event_id),
            change,
        })
    }

    pub(crate) fn row_to_object(row: &SqliteRow) -> Result<CatalogObject> {
        let metadata: Option<String> = row.get("metadata");
        let metadata = metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(CatalogObject {
            id: ObjectId::new(row.get("id")),
            remote_id: RemoteId::new(row.get("remote_id")),
            path: row.get("path"),
            name: row.get("name"),
            size: row.get("size"),
            is_dir: row.get("is_dir"),
            mime_type: row.get("mime_type"),
            mod_time: row
                .get::<Option<i64>, _>("mod_time")
                .map(Self::millis_to_datetime),
            remote_object_id: row.get("remote_object_id"),
            metadata,
            first_seen_at: Self::millis_to_datetime(row.get("first_seen_at")),
            last_seen_at: Self::millis_to_datetime(row.get("last_seen_at")),
        })
    }
}

const UPSERT_REMOTE: &str = r#"
    INSERT INTO remotes (name, created_at)
    VALUES (?, ?)
    ON CONFLICT(name) DO UPDATE SET name = excluded.name
    RETURNING id
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn file(path: &str, size: i64, md5: &str) -> ObjectDescriptor {
        let mut hashes = BTreeMap::new();
        hashes.insert("md5".to_string(), md5.to_string());
        ObjectDescriptor {
            id: Some(format!("id:{path}")),
            is_dir: false,
            mime_type: Some("text/plain".to_string()),
            mod_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            name: ObjectDescriptor::base_name(path).to_string(),
            path: path.to_string(),
            size,
            hashes,
            metadata: None,
        }
    }

    async fn count(db: &CatalogDb, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_creates_then_reports_unchanged() {
        let db = CatalogDb::open_memory().await.unwrap();
        let stamp = ScanStamp::now();
        let descriptor = file("rollbar/a.txt", 10, "abc123");

        let first = db.record("dbox:", &descriptor, None, &stamp).await.unwrap();
        assert_eq!(first.change, ObjectChange::Created);

        let second = db.record("dbox:", &descriptor, None, &ScanStamp::now()).await.unwrap();
        assert_eq!(second.change, ObjectChange::Unchanged);
        assert_eq!(second.object_id, first.object_id);
        assert_ne!(second.event_id, first.event_id);

        assert_eq!(count(&db, "catalog_objects").await, 1);
        assert_eq!(count(&db, "scan_events").await, 2);
        assert_eq!(count(&db, "remotes").await, 1);
    }

    #[tokio::test]
    async fn test_record_overwrites_changed_attributes() {
        let db = CatalogDb::open_memory().await.unwrap();
        let original = file("rollbar/a.txt", 10, "abc123");
        db.record("dbox:", &original, None, &ScanStamp::now()).await.unwrap();

        let grown = file("rollbar/a.txt", 20, "def456");
        let outcome = db.record("dbox:", &grown, None, &ScanStamp::now()).await.unwrap();
        assert_eq!(outcome.change, ObjectChange::Updated);

        let stored = db.get_object("dbox:", "rollbar/a.txt").await.unwrap().unwrap();
        assert_eq!(stored.size, 20);
        assert_eq!(count(&db, "catalog_objects").await, 1);
    }

    #[tokio::test]
    async fn test_same_path_on_two_remotes_is_two_objects() {
        let db = CatalogDb::open_memory().await.unwrap();
        let descriptor = file("shared/a.txt", 10, "abc123");

        let a = db.record("dbox:", &descriptor, None, &ScanStamp::now()).await.unwrap();
        let b = db.record("gdrive:", &descriptor, None, &ScanStamp::now()).await.unwrap();
        assert_ne!(a.object_id, b.object_id);
        assert_ne!(a.remote_id, b.remote_id);
    }

    #[tokio::test]
    async fn test_record_links_hash_and_stamp() {
        let db = CatalogDb::open_memory().await.unwrap();
        let stamp = ScanStamp::now();
        let hash_id = db
            .get_or_create_hash(&ContentHash::new("abc123", "md5").unwrap())
            .await
            .unwrap();

        let outcome = db
            .record("dbox:", &file("a.txt", 10, "abc123"), Some(hash_id), &stamp)
            .await
            .unwrap();

        let history = db.object_history("dbox:", "a.txt").await.unwrap();
        assert_eq!(history.len(), 1);
        let event = &history[0].event;
        assert_eq!(event.id, outcome.event_id);
        assert_eq!(event.hash_id, Some(hash_id));
        assert_eq!(event.run_id, stamp.run_id);
        assert_eq!(event.observed_at, stamp.observed_at);
    }

    #[tokio::test]
    async fn test_record_rejects_empty_inputs_before_io() {
        let db = CatalogDb::open_memory().await.unwrap();
        let stamp = ScanStamp::now();

        let result = db.record("", &file("a.txt", 1, "x"), None, &stamp).await;
        assert!(matches!(result, Err(DbError::Validation(_))));

        let result = db.record("dbox:", &file("", 1, "x"), None, &stamp).await;
        assert!(matches!(result, Err(DbError::Validation(_))));

        assert_eq!(count(&db, "remotes").await, 0);
    }

    #[tokio::test]
    async fn test_record_with_unknown_hash_id_rolls_back() {
        let db = CatalogDb::open_memory().await.unwrap();

        let result = db
            .record("dbox:", &file("a.txt", 1, "x"), Some(HashId::new(4242)), &ScanStamp::now())
            .await;
        assert!(matches!(result, Err(DbError::Sqlx(_))));

        // Nothing from the failed unit is visible
        assert_eq!(count(&db, "catalog_objects").await, 0);
        assert_eq!(count(&db, "scan_events").await, 0);
        assert_eq!(count(&db, "remotes").await, 0);
    }

    #[tokio::test]
    async fn test_metadata_round_trips() {
        let db = CatalogDb::open_memory().await.unwrap();
        let mut descriptor = file("a.txt", 1, "x");
        descriptor.metadata = Some(serde_json::json!({"content-type": "text/plain"}));

        db.record("dbox:", &descriptor, None, &ScanStamp::now()).await.unwrap();
        let stored = db.get_object("dbox:", "a.txt").await.unwrap().unwrap();
        assert_eq!(stored.metadata, descriptor.metadata);
        assert_eq!(stored.mod_time, descriptor.mod_time);
        assert_eq!(stored.remote_object_id.as_deref(), Some("id:a.txt"));
    }
}
