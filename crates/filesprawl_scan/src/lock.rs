//! Per-remote scan locks.
//!
//! One in-flight scan per remote name. Acquisition never waits: a second
//! scan of the same remote fails with [`ScanError::ScanInProgress`].
//! Different remotes lock independently.

use crate::error::{Result, ScanError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Arena of held scan locks keyed by remote name.
///
/// Clone shares the arena, so every orchestrator built from the same
/// `ScanLocks` excludes the others.
#[derive(Debug, Clone, Default)]
pub struct ScanLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ScanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `remote` or fail immediately if a scan holds it.
    pub fn try_acquire(&self, remote: &str) -> Result<ScanLockGuard> {
        if !self.held().insert(remote.to_string()) {
            debug!(remote, "Scan lock contended");
            return Err(ScanError::ScanInProgress(remote.to_string()));
        }

        debug!(remote, "Acquired scan lock");
        Ok(ScanLockGuard {
            remote: remote.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    /// Whether a scan of `remote` is in flight.
    pub fn is_locked(&self, remote: &str) -> bool {
        self.held().contains(remote)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the remote's scan lock when dropped.
#[derive(Debug)]
pub struct ScanLockGuard {
    remote: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl ScanLockGuard {
    pub fn remote(&self) -> &str {
        &self.remote
    }
}

impl Drop for ScanLockGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.remote);
        debug!(remote = %self.remote, "Released scan lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention() {
        let locks = ScanLocks::new();

        let _guard = locks.try_acquire("dbox:").unwrap();
        let second = locks.try_acquire("dbox:");
        assert!(matches!(second, Err(ScanError::ScanInProgress(remote)) if remote == "dbox:"));
    }

    #[test]
    fn test_remotes_lock_independently() {
        let locks = ScanLocks::new();

        let _a = locks.try_acquire("dbox:").unwrap();
        let _b = locks.try_acquire("gdrive:").unwrap();
        assert!(locks.is_locked("dbox:"));
        assert!(locks.is_locked("gdrive:"));
    }

    #[test]
    fn test_drop_releases_lock() {
        let locks = ScanLocks::new();

        let guard = locks.try_acquire("dbox:").unwrap();
        assert_eq!(guard.remote(), "dbox:");
        drop(guard);

        assert!(!locks.is_locked("dbox:"));
        let _again = locks.try_acquire("dbox:").unwrap();
    }

    #[test]
    fn test_clones_share_the_arena() {
        let locks = ScanLocks::new();
        let other = locks.clone();

        let _guard = locks.try_acquire("dbox:").unwrap();
        assert!(other.try_acquire("dbox:").is_err());
    }
}
