//! Config command - show or create the configuration file

use crate::cli::context::{default_config, default_config_path, SettingsArgs};
use anyhow::{Context, Result};
use clap::Subcommand;
use filesprawl_scan::ScanConfig;
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(settings: &SettingsArgs, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = redacted(settings.resolve()?);
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = match &settings.config {
                Some(path) => path.clone(),
                None => default_config_path()?,
            };
            let config = settings.resolve_for_init()?;
            init(&path, &config, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn redacted(mut config: ScanConfig) -> ScanConfig {
    if config.rc.pass.is_some() {
        config.rc.pass = Some("********".to_string());
    }
    config
}

fn init(path: &Path, config: &ScanConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

impl SettingsArgs {
    /// Defaults plus overrides, ignoring any existing config file.
    fn resolve_for_init(&self) -> Result<ScanConfig> {
        let without_file = SettingsArgs {
            config: None,
            db: self.db.clone(),
            rc_url: self.rc_url.clone(),
            rc_user: self.rc_user.clone(),
            rc_pass: None,
            workers: self.workers,
        };
        let mut config = default_config()?;
        without_file.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
