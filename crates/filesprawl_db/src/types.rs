//! Catalog entities shared by the store, the scan engine and the CLI.

use crate::error::{DbError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use filesprawl_ids::{EventId, HashId, ObjectId, RemoteId, ScanRunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Object model
// ============================================================================

/// A configured storage backend, referenced by the name the listing service
/// understands (for example `"dbox:"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
    pub id: RemoteId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A (value, algorithm) pair identifying content.
///
/// Two objects carrying the same pair are the same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentHash {
    pub value: String,
    pub hash_type: String,
}

impl ContentHash {
    /// Build a validated hash pair.
    pub fn new(value: impl Into<String>, hash_type: impl Into<String>) -> Result<Self> {
        let hash = Self {
            value: value.into(),
            hash_type: hash_type.into(),
        };
        hash.validate()?;
        Ok(hash)
    }

    pub fn validate(&self) -> Result<()> {
        if self.value.trim().is_empty() {
            return Err(DbError::validation("content hash value is empty"));
        }
        if self.hash_type.trim().is_empty() {
            return Err(DbError::validation("content hash type is empty"));
        }
        Ok(())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hash_type, self.value)
    }
}

/// A raw object record from a listing, before catalog resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Backend-native object id, when the remote has one
    pub id: Option<String>,
    pub is_dir: bool,
    pub mime_type: Option<String>,
    pub mod_time: Option<DateTime<Utc>>,
    pub name: String,
    /// Path relative to the remote root
    pub path: String,
    /// Size in bytes; `-1` when the remote does not know it
    pub size: i64,
    /// Hash algorithm name → hex digest; empty for directories
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ObjectDescriptor {
    /// Last path segment, used when a listing omits the name.
    pub fn base_name(path: &str) -> &str {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((_, base)) => base,
            None => trimmed,
        }
    }

    /// Pick the first hash in preference order that this descriptor carries.
    pub fn preferred_hash(&self, preference: &[String]) -> Option<ContentHash> {
        preference
            .iter()
            .filter_map(|kind| {
                self.hashes
                    .get(kind)
                    .filter(|value| !value.trim().is_empty())
                    .map(|value| ContentHash {
                        value: value.clone(),
                        hash_type: kind.clone(),
                    })
            })
            .next()
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(DbError::validation("object path is empty"));
        }
        Ok(())
    }
}

/// The canonical persisted record for a path under a remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogObject {
    pub id: ObjectId,
    pub remote_id: RemoteId,
    pub path: String,
    pub name: String,
    pub size: i64,
    pub is_dir: bool,
    pub mime_type: Option<String>,
    pub mod_time: Option<DateTime<Utc>>,
    pub remote_object_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// An immutable observation linking object, content and remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub id: EventId,
    pub object_id: ObjectId,
    /// `None` for directories and for files the remote could not hash
    pub hash_id: Option<HashId>,
    pub remote_id: RemoteId,
    pub run_id: ScanRunId,
    pub observed_at: DateTime<Utc>,
}

/// Identity of one scan run, shared by every event it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStamp {
    pub run_id: ScanRunId,
    /// Captured once when the run starts, at the millisecond precision
    /// events are stored with
    pub observed_at: DateTime<Utc>,
}

impl ScanStamp {
    pub fn now() -> Self {
        Self {
            run_id: ScanRunId::new(),
            observed_at: Utc::now().trunc_subsecs(3),
        }
    }
}

// ============================================================================
// Writer results
// ============================================================================

/// What recording a descriptor did to its catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectChange {
    Created,
    Updated,
    Unchanged,
}

impl ObjectChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for ObjectChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of recording one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub remote_id: RemoteId,
    pub object_id: ObjectId,
    pub event_id: EventId,
    pub change: ObjectChange,
}

// ============================================================================
// Query results
// ============================================================================

/// An object whose latest observation carries a given hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHolding {
    pub remote: String,
    pub path: String,
    pub observed_at: DateTime<Utc>,
}

/// A (remote, path) ever observed with a given hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLocation {
    pub remote: String,
    pub path: String,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

/// One entry of an object's observation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub event: ScanEvent,
    pub hash: Option<ContentHash>,
}

/// Row counts across the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub remotes: u64,
    pub hashes: u64,
    pub objects: u64,
    pub events: u64,
}

/// Reject an empty remote name before it reaches storage.
pub fn validate_remote_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DbError::validation("remote name is empty"));
    }
    Ok(())
}
