//! Remote listing sources.
//!
//! A [`ListingSource`] answers one non-recursive directory listing per call.
//! [`Listing`] turns that into a lazy walk of a whole tree, holding at most
//! one page of descriptors plus the queue of directories still to visit.

pub mod rclone;

use crate::error::ListingError;
use async_trait::async_trait;
use filesprawl_db::ObjectDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

pub use rclone::RcClient;

/// Descriptors returned for one directory
pub type ListPage = Vec<ObjectDescriptor>;

/// Listing options in rc wire shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default)]
    pub recurse: bool,
    #[serde(default)]
    pub no_mod_time: bool,
    /// Show encrypted names alongside decrypted ones on crypt remotes
    #[serde(default)]
    pub show_encrypted: bool,
    #[serde(default)]
    pub show_hash: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hash_types: Vec<String>,
    #[serde(default)]
    pub no_mime_type: bool,
    #[serde(default, rename = "showOrigIDs")]
    pub show_orig_ids: bool,
    #[serde(default)]
    pub dirs_only: bool,
    #[serde(default)]
    pub files_only: bool,
    #[serde(default)]
    pub metadata: bool,
}

/// One listing call: a directory under a remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub remote: String,
    pub path: String,
    pub options: ListOptions,
}

/// Anything that can list a directory of a remote.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn list(&self, request: &ListRequest) -> Result<ListPage, ListingError>;
}

/// Lazy, restartable-from-scratch walk over a remote tree.
///
/// Directories are yielded before their contents. Once a call fails the
/// cursor is finished; start a new one to retry.
pub struct Listing {
    source: Arc<dyn ListingSource>,
    remote: String,
    options: ListOptions,
    recursive: bool,
    page: VecDeque<ObjectDescriptor>,
    pending: VecDeque<String>,
    pages_fetched: u64,
    finished: bool,
}

impl Listing {
    pub fn new(
        source: Arc<dyn ListingSource>,
        remote: impl Into<String>,
        start_path: impl Into<String>,
        options: ListOptions,
        recursive: bool,
    ) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(start_path.into());
        Self {
            source,
            remote: remote.into(),
            options: ListOptions {
                recurse: false,
                ..options
            },
            recursive,
            page: VecDeque::new(),
            pending,
            pages_fetched: 0,
            finished: false,
        }
    }

    /// Pull the next descriptor, fetching the next directory page when the
    /// current one is drained. `Ok(None)` marks the end of the tree.
    pub async fn next(&mut self) -> Result<Option<ObjectDescriptor>, ListingError> {
        loop {
            if let Some(descriptor) = self.page.pop_front() {
                if self.recursive && descriptor.is_dir {
                    self.pending.push_back(descriptor.path.clone());
                }
                return Ok(Some(descriptor));
            }

            if self.finished {
                return Ok(None);
            }
            let Some(path) = self.pending.pop_front() else {
                self.finished = true;
                return Ok(None);
            };

            let request = ListRequest {
                remote: self.remote.clone(),
                path,
                options: self.options.clone(),
            };
            trace!(remote = %request.remote, path = %request.path, "Listing directory");

            match self.source.list(&request).await {
                Ok(items) => {
                    self.pages_fetched += 1;
                    debug!(
                        remote = %request.remote,
                        path = %request.path,
                        items = items.len(),
                        pending = self.pending.len(),
                        "Fetched listing page"
                    );
                    self.page.extend(items);
                }
                Err(err) => {
                    self.finished = true;
                    self.pending.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Drain the whole walk into memory.
    pub async fn collect(mut self) -> Result<Vec<ObjectDescriptor>, ListingError> {
        let mut out = Vec::new();
        while let Some(descriptor) = self.next().await? {
            out.push(descriptor);
        }
        Ok(out)
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }
}
