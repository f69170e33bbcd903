//! Effective settings for a command: config file, then env and flags.

use anyhow::{Context, Result};
use clap::Args;
use filesprawl_db::CatalogDb;
use filesprawl_scan::ScanConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "config.toml";
const CATALOG_FILE: &str = "catalog.sqlite3";

/// Settings shared by every command
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Config file (default: $FILESPRAWL_HOME/config.toml if present)
    #[arg(long, global = true, env = "FILESPRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database path
    #[arg(long, global = true, env = "FILESPRAWL_DB")]
    pub db: Option<PathBuf>,

    /// rc server URL
    #[arg(long, global = true, env = "FILESPRAWL_RC_URL")]
    pub rc_url: Option<String>,

    /// rc basic auth user
    #[arg(long, global = true, env = "FILESPRAWL_RC_USER")]
    pub rc_user: Option<String>,

    /// rc basic auth password
    #[arg(long, global = true, env = "FILESPRAWL_RC_PASS", hide_env_values = true)]
    pub rc_pass: Option<String>,

    /// Concurrent catalog writers per scan
    #[arg(long, global = true)]
    pub workers: Option<usize>,
}

/// Default config file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(filesprawl_logging::filesprawl_home()?.join(CONFIG_FILE))
}

/// Defaults with the catalog under the filesprawl home directory
pub fn default_config() -> Result<ScanConfig> {
    Ok(ScanConfig {
        database_path: filesprawl_logging::filesprawl_home()?
            .join(CATALOG_FILE)
            .to_string_lossy()
            .to_string(),
        ..ScanConfig::default()
    })
}

impl SettingsArgs {
    /// Load the config file if any and apply overrides on top.
    pub fn resolve(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => load(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    load(&path)?
                } else {
                    default_config()?
                }
            }
        };

        self.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub(crate) fn apply(&self, config: &mut ScanConfig) {
        if let Some(db) = &self.db {
            config.database_path = db.to_string_lossy().to_string();
        }
        if let Some(url) = &self.rc_url {
            config.rc.url = url.clone();
        }
        if let Some(user) = &self.rc_user {
            config.rc.user = Some(user.clone());
        }
        if let Some(pass) = &self.rc_pass {
            config.rc.pass = Some(pass.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }

    /// Open the catalog, creating it if needed.
    pub async fn open_catalog(&self) -> Result<CatalogDb> {
        let config = self.resolve()?;
        open_catalog(&config).await
    }
}

pub async fn open_catalog(config: &ScanConfig) -> Result<CatalogDb> {
    debug!(path = %config.database_path, "Opening catalog");
    CatalogDb::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open catalog at {}", config.database_path))
}

fn load(path: &Path) -> Result<ScanConfig> {
    ScanConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}
