//! Configuration for scan runs

use crate::error::{Result, ScanError};
use crate::source::ListOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the scan engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Path to the SQLite catalog
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// rc server connection
    #[serde(default)]
    pub rc: RcConfig,

    /// Descriptors processed concurrently within one scan
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Descend into subdirectories
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Hash algorithms in preference order; the first one present on a
    /// descriptor becomes its content identity
    #[serde(default = "default_hash_types")]
    pub hash_types: Vec<String>,

    /// Ask the remote for per-object metadata
    #[serde(default)]
    pub metadata: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Where and how to reach the rc server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcConfig {
    #[serde(default = "default_rc_url")]
    pub url: String,

    /// Basic auth user; no credentials is a valid mode
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub pass: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Bounded exponential backoff for transient listing failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total listing attempts per run, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Lowest accepted attempt ceiling
pub const MIN_ATTEMPTS: u32 = 3;

fn default_database_path() -> String {
    dirs::home_dir()
        .map(|h| h.join(".filesprawl").join("catalog.sqlite3"))
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog.sqlite3".to_string())
}

fn default_workers() -> usize {
    4
}

fn default_recursive() -> bool {
    true
}

fn default_hash_types() -> Vec<String> {
    vec!["md5".to_string(), "dropbox".to_string()]
}

fn default_rc_url() -> String {
    "http://localhost:5572".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            rc: RcConfig::default(),
            workers: default_workers(),
            recursive: default_recursive(),
            hash_types: default_hash_types(),
            metadata: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RcConfig {
    fn default() -> Self {
        Self {
            url: default_rc_url(),
            user: None,
            pass: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScanConfig =
            toml::from_str(&content).map_err(|e| ScanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ScanError::Config("workers must be at least 1".into()));
        }
        if self.rc.url.trim().is_empty() {
            return Err(ScanError::Config("rc.url must not be empty".into()));
        }
        if self.hash_types.iter().any(|t| t.trim().is_empty()) {
            return Err(ScanError::Config("hash_types entries must not be empty".into()));
        }
        if self.retry.max_attempts < MIN_ATTEMPTS {
            return Err(ScanError::Config(format!(
                "retry.max_attempts must be at least {MIN_ATTEMPTS}, got {}",
                self.retry.max_attempts
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ScanError::Config(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Options sent with every non-recursive page request.
    ///
    /// Recursion is driven client-side by the listing cursor.
    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            show_hash: true,
            hash_types: self.hash_types.clone(),
            metadata: self.metadata,
            ..ListOptions::default()
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` counts failures so far.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl RcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert!(
            config.database_path.ends_with("catalog.sqlite3"),
            "unexpected database path: {}",
            config.database_path
        );
        assert_eq!(config.workers, 4);
        assert_eq!(config.hash_types, vec!["md5", "dropbox"]);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ScanConfig = toml::from_str(
            r#"
            workers = 8

            [rc]
            url = "http://rc.internal:5572"
            user = "scanner"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.rc.url, "http://rc.internal:5572");
        assert_eq!(config.rc.user.as_deref(), Some("scanner"));
        assert_eq!(config.rc.pass, None);
        assert_eq!(config.rc.timeout_secs, 60);
        assert!(config.recursive);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("filesprawl.toml");

        let config = ScanConfig {
            database_path: "test.sqlite3".to_string(),
            hash_types: vec!["sha1".to_string()],
            metadata: true,
            ..ScanConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(ScanConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_low_attempt_ceiling() {
        let config = ScanConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));

        let config = ScanConfig {
            workers: 0,
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_list_options_request_hashes() {
        let config = ScanConfig::default();
        let opts = config.list_options();
        assert!(opts.show_hash);
        assert!(!opts.recurse);
        assert_eq!(opts.hash_types, vec!["md5", "dropbox"]);
    }
}
