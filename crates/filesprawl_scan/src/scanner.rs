//! Scan orchestration.
//!
//! A run takes the remote's scan lock, stamps every observation with one
//! run id and timestamp, pulls descriptors from a [`Listing`] and hands them
//! to a bounded set of worker tasks that resolve content identity and write
//! the catalog. Listing keeps running while workers persist.
//!
//! Item failures are collected and the walk continues. Listing failures
//! that are transient restart the walk from scratch after a backoff. Before
//! a restart every in-flight write settles, and the restarted walk skips
//! paths that already carry an event from this run, so no event is written
//! twice.

use crate::cancel::CancellationToken;
use crate::config::ScanConfig;
use crate::error::{ErrorKind, ListingError, Result, ScanError};
use crate::lock::ScanLocks;
use crate::source::{Listing, ListingSource};
use chrono::{DateTime, Utc};
use filesprawl_db::{CatalogDb, DbError, ObjectChange, ObjectDescriptor, ScanStamp};
use filesprawl_ids::ScanRunId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Lifecycle of one scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Listing,
    Resolving,
    Persisting,
    Completed,
    Failed,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listing => "listing",
            Self::Resolving => "resolving",
            Self::Persisting => "persisting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed phase moves. A retry moves Resolving back to Listing.
    pub fn can_transition_to(&self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        match (self, next) {
            (Idle, Listing) => true,
            (Listing, Resolving) | (Listing, Persisting) => true,
            (Resolving, Listing) | (Resolving, Persisting) => true,
            (Persisting, Completed) => true,
            (Idle, _) => false,
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Step of per-item processing that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Resolve,
    Record,
    Worker,
}

/// A descriptor that could not be cataloged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Unknown only when the worker task itself died
    pub path: Option<String>,
    pub stage: ItemStage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ScanError> for ScanFailure {
    fn from(err: &ScanError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Scan statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Descriptors dispatched to workers
    pub seen: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
    /// Descriptors re-listed after a restart and skipped
    pub skipped: u64,
    pub listing_attempts: u32,
    pub duration_ms: u64,
}

/// Result of a scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub run_id: ScanRunId,
    pub remote: String,
    pub path: String,
    pub observed_at: DateTime<Utc>,
    pub phase: ScanPhase,
    pub failure: Option<ScanFailure>,
    pub stats: ScanStats,
    pub errors: Vec<ItemError>,
}

impl ScanResult {
    pub fn is_completed(&self) -> bool {
        self.phase == ScanPhase::Completed
    }

    /// Completed, but some items are stale in the catalog.
    pub fn is_partial(&self) -> bool {
        self.is_completed() && !self.errors.is_empty()
    }
}

/// Outcome of one worker task
struct ItemReport {
    path: String,
    outcome: std::result::Result<ObjectChange, (ItemStage, DbError)>,
}

/// What every worker of a run shares
#[derive(Clone)]
struct ItemContext {
    db: CatalogDb,
    remote: Arc<str>,
    hash_types: Arc<[String]>,
    stamp: ScanStamp,
}

impl ItemContext {
    async fn process(self, descriptor: ObjectDescriptor) -> ItemReport {
        let outcome = self.resolve_and_record(&descriptor).await;
        ItemReport {
            path: descriptor.path,
            outcome,
        }
    }

    async fn resolve_and_record(
        &self,
        descriptor: &ObjectDescriptor,
    ) -> std::result::Result<ObjectChange, (ItemStage, DbError)> {
        let hash = if descriptor.is_dir {
            None
        } else {
            descriptor.preferred_hash(&self.hash_types)
        };

        let hash_id = match hash {
            Some(hash) => Some(
                self.db
                    .get_or_create_hash(&hash)
                    .await
                    .map_err(|e| (ItemStage::Resolve, e))?,
            ),
            None => None,
        };

        let outcome = self
            .db
            .record(&self.remote, descriptor, hash_id, &self.stamp)
            .await
            .map_err(|e| (ItemStage::Record, e))?;
        Ok(outcome.change)
    }
}

/// Mutable bookkeeping for a run in progress
struct RunState {
    result: ScanResult,
}

impl RunState {
    fn advance(&mut self, next: ScanPhase) {
        let current = self.result.phase;
        if current == next {
            return;
        }
        if current.can_transition_to(next) {
            debug!(remote = %self.result.remote, from = %current, to = %next, "Scan phase");
            self.result.phase = next;
        } else {
            warn!(remote = %self.result.remote, from = %current, to = %next, "Ignoring invalid scan phase transition");
        }
    }

    fn fail(&mut self, err: &ScanError) {
        if self.result.failure.is_none() {
            self.result.failure = Some(ScanFailure::from(err));
        }
    }

    fn absorb(&mut self, joined: std::result::Result<ItemReport, JoinError>) {
        let stats = &mut self.result.stats;
        match joined {
            Ok(ItemReport {
                outcome: Ok(change),
                ..
            }) => match change {
                ObjectChange::Created => stats.created += 1,
                ObjectChange::Updated => stats.updated += 1,
                ObjectChange::Unchanged => stats.unchanged += 1,
            },
            Ok(ItemReport {
                path,
                outcome: Err((stage, err)),
            }) => {
                warn!(remote = %self.result.remote, path = %path, error = %err, "Failed to catalog item");
                stats.errors += 1;
                self.result.errors.push(ItemError {
                    path: Some(path),
                    stage,
                    kind: ErrorKind::from(&err),
                    message: err.to_string(),
                });
            }
            Err(err) => {
                warn!(remote = %self.result.remote, error = %err, "Scan worker task failed");
                stats.errors += 1;
                self.result.errors.push(ItemError {
                    path: None,
                    stage: ItemStage::Worker,
                    kind: ErrorKind::Persistence,
                    message: err.to_string(),
                });
            }
        }
    }
}

/// Remote scanner
#[derive(Clone)]
pub struct Scanner {
    db: CatalogDb,
    source: Arc<dyn ListingSource>,
    config: ScanConfig,
    locks: ScanLocks,
}

impl Scanner {
    /// Create a scanner with its own lock arena
    pub fn new(db: CatalogDb, source: Arc<dyn ListingSource>, config: ScanConfig) -> Self {
        Self {
            db,
            source,
            config,
            locks: ScanLocks::new(),
        }
    }

    /// Share a lock arena with other scanners
    pub fn with_locks(mut self, locks: ScanLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &ScanLocks {
        &self.locks
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn db(&self) -> &CatalogDb {
        &self.db
    }

    /// Scan `path` under `remote` to completion.
    ///
    /// Convenience wrapper for `scan()` with no cancellation.
    pub async fn scan_remote(&self, remote: &str, path: &str) -> Result<ScanResult> {
        self.scan(remote, path, &CancellationToken::new()).await
    }

    /// Scan `path` under `remote` and update the catalog.
    ///
    /// Returns `Err` only when the run could not start (bad input, remote
    /// already being scanned). A run that started always comes back as a
    /// `ScanResult`, `Failed` if the walk did not finish.
    pub async fn scan(
        &self,
        remote: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        filesprawl_db::validate_remote_name(remote)
            .map_err(|e| ScanError::Validation(e.to_string()))?;
        self.config.validate()?;

        let _guard = self.locks.try_acquire(remote)?;

        let start = Instant::now();
        let stamp = ScanStamp::now();
        info!(remote, path, run_id = %stamp.run_id, "Starting scan");

        let mut run = RunState {
            result: ScanResult {
                run_id: stamp.run_id.clone(),
                remote: remote.to_string(),
                path: path.to_string(),
                observed_at: stamp.observed_at,
                phase: ScanPhase::Idle,
                failure: None,
                stats: ScanStats::default(),
                errors: Vec::new(),
            },
        };

        let ctx = ItemContext {
            db: self.db.clone(),
            remote: Arc::from(remote),
            hash_types: Arc::from(self.config.hash_types.clone()),
            stamp,
        };

        let mut workers: JoinSet<ItemReport> = JoinSet::new();
        self.walk(&mut run, &ctx, &mut workers, cancel).await;

        // In-flight writes finish even after a failure or cancel
        if run.result.failure.is_none() {
            run.advance(ScanPhase::Persisting);
        }
        while let Some(joined) = workers.join_next().await {
            run.absorb(joined);
        }

        let mut result = run.result;
        result.phase = if result.failure.is_some() {
            ScanPhase::Failed
        } else {
            ScanPhase::Completed
        };
        result.stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            remote,
            path,
            run_id = %result.run_id,
            phase = %result.phase,
            seen = result.stats.seen,
            created = result.stats.created,
            updated = result.stats.updated,
            unchanged = result.stats.unchanged,
            errors = result.stats.errors,
            attempts = result.stats.listing_attempts,
            duration_ms = result.stats.duration_ms,
            "Scan finished"
        );
        Ok(result)
    }

    /// Drive the listing with retries, dispatching descriptors to workers.
    async fn walk(
        &self,
        run: &mut RunState,
        ctx: &ItemContext,
        workers: &mut JoinSet<ItemReport>,
        cancel: &CancellationToken,
    ) {
        let workers_max = self.config.workers.max(1);
        let retry = &self.config.retry;
        // Paths whose item failed before a restart; they have no event to find
        let mut failed: HashSet<String> = HashSet::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            run.result.stats.listing_attempts = attempt;
            run.advance(ScanPhase::Listing);

            let mut listing = Listing::new(
                Arc::clone(&self.source),
                ctx.remote.to_string(),
                run.result.path.clone(),
                self.config.list_options(),
                self.config.recursive,
            );

            let err = loop {
                if cancel.is_cancelled() {
                    run.fail(&ScanError::Cancelled);
                    return;
                }
                while let Some(joined) = workers.try_join_next() {
                    run.absorb(joined);
                }

                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        run.fail(&ScanError::Cancelled);
                        return;
                    }
                    next = listing.next() => next,
                };

                let descriptor = match next {
                    Ok(Some(descriptor)) => descriptor,
                    Ok(None) => return,
                    Err(err) => break err,
                };

                if attempt > 1 {
                    if failed.contains(&descriptor.path) {
                        run.result.stats.skipped += 1;
                        continue;
                    }
                    match ctx
                        .db
                        .run_has_event(&ctx.stamp.run_id, &ctx.remote, &descriptor.path)
                        .await
                    {
                        Ok(true) => {
                            run.result.stats.skipped += 1;
                            continue;
                        }
                        Ok(false) => {}
                        Err(err) => {
                            run.absorb(Ok(ItemReport {
                                path: descriptor.path,
                                outcome: Err((ItemStage::Record, err)),
                            }));
                            continue;
                        }
                    }
                }

                while workers.len() >= workers_max {
                    if let Some(joined) = workers.join_next().await {
                        run.absorb(joined);
                    }
                }

                if cancel.is_cancelled() {
                    run.fail(&ScanError::Cancelled);
                    return;
                }
                run.result.stats.seen += 1;
                run.advance(ScanPhase::Resolving);
                workers.spawn(ctx.clone().process(descriptor));
            };

            if !self.should_retry(&err, attempt) {
                warn!(remote = %run.result.remote, attempt, error = %err, "Listing failed");
                run.fail(&ScanError::Listing(err));
                return;
            }

            while let Some(joined) = workers.join_next().await {
                run.absorb(joined);
            }
            failed = run
                .result
                .errors
                .iter()
                .filter_map(|e| e.path.clone())
                .collect();

            let delay = retry.delay_for(attempt);
            warn!(
                remote = %run.result.remote,
                attempt,
                max_attempts = retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Listing unavailable, restarting from scratch"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    run.fail(&ScanError::Cancelled);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn should_retry(&self, err: &ListingError, attempt: u32) -> bool {
        err.is_transient() && attempt < self.config.retry.max_attempts
    }
}
