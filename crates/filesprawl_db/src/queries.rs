//! Read-side catalog queries.

use crate::error::Result;
use crate::types::*;
use crate::CatalogDb;
use filesprawl_ids::{EventId, HashId, ObjectId, RemoteId, ScanRunId};
use sqlx::Row;

impl CatalogDb {
    /// Get the catalog object for a path under a remote.
    pub async fn get_object(&self, remote: &str, path: &str) -> Result<Option<CatalogObject>> {
        let row = sqlx::query(
            r#"
            SELECT o.id, o.remote_id, o.path, o.name, o.size, o.is_dir, o.mime_type, o.mod_time,
                   o.remote_object_id, o.metadata, o.first_seen_at, o.last_seen_at
            FROM catalog_objects o
            JOIN remotes r ON r.id = o.remote_id
            WHERE r.name = ? AND o.path = ?
            "#,
        )
        .bind(remote)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_object).transpose()
    }

    /// List all remotes ever scanned.
    pub async fn list_remotes(&self) -> Result<Vec<Remote>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM remotes ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Remote {
                id: RemoteId::new(row.get("id")),
                name: row.get("name"),
                created_at: Self::millis_to_datetime(row.get("created_at")),
            })
            .collect())
    }

    /// Objects whose most recent observation carries `hash`.
    ///
    /// Answers "which remotes currently hold a copy of this content".
    pub async fn remotes_holding(&self, hash: &ContentHash) -> Result<Vec<RemoteHolding>> {
        hash.validate()?;

        let rows = sqlx::query(
            r#"
            SELECT r.name AS remote, o.path AS path, e.observed_at AS observed_at
            FROM scan_events e
            JOIN catalog_objects o ON o.id = e.object_id
            JOIN remotes r ON r.id = e.remote_id
            JOIN content_hashes h ON h.id = e.hash_id
            WHERE h.hash_value = ? AND h.hash_type = ?
              AND e.id = (SELECT MAX(latest.id) FROM scan_events latest WHERE latest.object_id = e.object_id)
            ORDER BY r.name, o.path
            "#,
        )
        .bind(&hash.value)
        .bind(&hash.hash_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RemoteHolding {
                remote: row.get("remote"),
                path: row.get("path"),
                observed_at: Self::millis_to_datetime(row.get("observed_at")),
            })
            .collect())
    }

    /// Every (remote, path) ever observed with `hash`, with the first and
    /// last time it was seen there.
    pub async fn paths_for_hash(&self, hash: &ContentHash) -> Result<Vec<ObjectLocation>> {
        hash.validate()?;

        let rows = sqlx::query(
            r#"
            SELECT r.name AS remote, o.path AS path,
                   MIN(e.observed_at) AS first_observed_at,
                   MAX(e.observed_at) AS last_observed_at
            FROM scan_events e
            JOIN catalog_objects o ON o.id = e.object_id
            JOIN remotes r ON r.id = e.remote_id
            JOIN content_hashes h ON h.id = e.hash_id
            WHERE h.hash_value = ? AND h.hash_type = ?
            GROUP BY r.name, o.path
            ORDER BY first_observed_at, r.name, o.path
            "#,
        )
        .bind(&hash.value)
        .bind(&hash.hash_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ObjectLocation {
                remote: row.get("remote"),
                path: row.get("path"),
                first_observed_at: Self::millis_to_datetime(row.get("first_observed_at")),
                last_observed_at: Self::millis_to_datetime(row.get("last_observed_at")),
            })
            .collect())
    }

    /// Observation history for one object, oldest first.
    pub async fn object_history(&self, remote: &str, path: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.object_id, e.hash_id, e.remote_id, e.run_id, e.observed_at,
                   h.hash_value, h.hash_type
            FROM scan_events e
            JOIN catalog_objects o ON o.id = e.object_id
            JOIN remotes r ON r.id = e.remote_id
            LEFT JOIN content_hashes h ON h.id = e.hash_id
            WHERE r.name = ? AND o.path = ?
            ORDER BY e.id
            "#,
        )
        .bind(remote)
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<HistoryEntry> {
                let run_id: String = row.get("run_id");
                let hash_value: Option<String> = row.get("hash_value");
                let hash_type: Option<String> = row.get("hash_type");

                Ok(HistoryEntry {
                    event: ScanEvent {
                        id: EventId::new(row.get("id")),
                        object_id: ObjectId::new(row.get("object_id")),
                        hash_id: row.get::<Option<i64>, _>("hash_id").map(HashId::new),
                        remote_id: RemoteId::new(row.get("remote_id")),
                        run_id: ScanRunId::parse(&run_id).map_err(|e| {
                            crate::DbError::validation(format!("stored run id: {e}"))
                        })?,
                        observed_at: Self::millis_to_datetime(row.get("observed_at")),
                    },
                    hash: hash_value
                        .zip(hash_type)
                        .map(|(value, hash_type)| ContentHash { value, hash_type }),
                })
            })
            .collect()
    }

    /// Number of events written by one scan run.
    pub async fn count_run_events(&self, run_id: &ScanRunId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_events WHERE run_id = ?")
            .bind(run_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Whether a run already wrote an event for a path under a remote.
    pub async fn run_has_event(&self, run_id: &ScanRunId, remote: &str, path: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM scan_events e
                JOIN catalog_objects o ON o.id = e.object_id
                JOIN remotes r ON r.id = e.remote_id
                WHERE e.run_id = ? AND r.name = ? AND o.path = ?
            )
            "#,
        )
        .bind(run_id.as_str())
        .bind(remote)
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    /// Row counts across the catalog.
    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM remotes) AS remotes,
                (SELECT COUNT(*) FROM content_hashes) AS hashes,
                (SELECT COUNT(*) FROM catalog_objects) AS objects,
                (SELECT COUNT(*) FROM scan_events) AS events
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStats {
            remotes: row.get::<i64, _>("remotes") as u64,
            hashes: row.get::<i64, _>("hashes") as u64,
            objects: row.get::<i64, _>("objects") as u64,
            events: row.get::<i64, _>("events") as u64,
        })
    }
}
