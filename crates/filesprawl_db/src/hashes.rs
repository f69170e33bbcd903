//! Content identity: mapping (value, type) pairs to stable hash ids.
//!
//! Three variants with different concurrency contracts:
//!
//! - [`CatalogDb::get_or_create_hash`]: converges on one row under races.
//! - [`CatalogDb::create_hash`]: first write wins, later writers get
//!   [`DbError::Conflict`].
//! - [`CatalogDb::lookup_hash`]: read only, [`DbError::NotFound`] if absent.

use crate::error::{DbError, Result};
use crate::types::ContentHash;
use crate::CatalogDb;
use filesprawl_ids::HashId;
use tracing::debug;

impl CatalogDb {
    /// Return the id for `hash`, inserting the row if it does not exist.
    ///
    /// A single conditional upsert; a duplicate-key conflict is resolved by
    /// the statement itself and yields the existing id.
    pub async fn get_or_create_hash(&self, hash: &ContentHash) -> Result<HashId> {
        hash.validate()?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO content_hashes (hash_value, hash_type, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(hash_value, hash_type) DO UPDATE SET
                hash_value = excluded.hash_value
            RETURNING id
            "#,
        )
        .bind(&hash.value)
        .bind(&hash.hash_type)
        .bind(Self::now_millis())
        .fetch_one(&self.pool)
        .await?;

        debug!(hash = %hash, id, "Resolved content hash");
        Ok(HashId::new(id))
    }

    /// Insert `hash`, failing if the pair is already recorded.
    pub async fn create_hash(&self, hash: &ContentHash) -> Result<HashId> {
        hash.validate()?;

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO content_hashes (hash_value, hash_type, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&hash.value)
        .bind(&hash.hash_type)
        .bind(Self::now_millis())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(HashId::new(id)),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(DbError::conflict(format!("content hash {hash}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Look up the id for `hash` without creating it.
    pub async fn lookup_hash(&self, hash: &ContentHash) -> Result<HashId> {
        hash.validate()?;

        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM content_hashes WHERE hash_value = ? AND hash_type = ?",
        )
        .bind(&hash.value)
        .bind(&hash.hash_type)
        .fetch_optional(&self.pool)
        .await?;

        id.map(HashId::new)
            .ok_or_else(|| DbError::not_found(format!("content hash {hash}")))
    }

    /// Catalog query API: resolve a raw (value, type) pair.
    pub async fn resolve_hash(&self, value: &str, hash_type: &str) -> Result<HashId> {
        let hash = ContentHash::new(value, hash_type)?;
        self.lookup_hash(&hash).await
    }

    /// Fetch the pair stored under `id`.
    pub async fn get_hash(&self, id: HashId) -> Result<ContentHash> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT hash_value, hash_type FROM content_hashes WHERE id = ?")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(value, hash_type)| ContentHash { value, hash_type })
            .ok_or_else(|| DbError::not_found(format!("content hash id {id}")))
    }
}
