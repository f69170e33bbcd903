//! Remote scanning for filesprawl.
//!
//! Lists remotes through an rclone rc server and records what it sees into
//! the catalog:
//! - [`source`]: the listing trait, the lazy tree walk and the rc client
//! - [`scanner`]: per-run orchestration with bounded workers and retries
//! - [`lock`]: one scan per remote at a time
//! - [`config`]: TOML-backed settings

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
pub mod scanner;
pub mod source;

pub use cancel::CancellationToken;
pub use config::{RcConfig, RetryPolicy, ScanConfig};
pub use error::{ErrorKind, ListingError, Result, ScanError};
pub use lock::{ScanLockGuard, ScanLocks};
pub use scanner::{
    ItemError, ItemStage, ScanFailure, ScanPhase, ScanResult, ScanStats, Scanner,
};
pub use source::{ListOptions, ListPage, ListRequest, Listing, ListingSource, RcClient};
