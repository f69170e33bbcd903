//! filesprawl command line
//!
//! Scans rclone remotes through an rc server into a local catalog and
//! answers questions about where content lives.

use clap::{Parser, Subcommand};
use filesprawl_logging::{init_logging, LogConfig};
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "filesprawl", version, about = "Catalog files across rclone remotes")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(flatten)]
    settings: cli::context::SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a remote path and record what is there.
    ///
    /// Exits 1 if the scan failed and 2 if it completed with item errors.
    Scan {
        /// Remote name as configured in rclone, e.g. "dbox:"
        remote: String,

        /// Path under the remote (default: its root)
        #[arg(default_value = "")]
        path: String,

        /// Only scan the top level of the path
        #[arg(long)]
        no_recursive: bool,

        /// Output the scan result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a remote path through the rc server without touching the catalog
    List {
        remote: String,

        #[arg(default_value = "")]
        path: String,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Output descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the catalog id of a content hash
    ResolveHash {
        /// Hash value, e.g. "872f92f3"
        value: String,

        /// Hash type, e.g. "md5"
        hash_type: String,
    },

    /// Remotes currently holding content with this hash
    Holders {
        value: String,
        hash_type: String,

        #[arg(long)]
        json: bool,
    },

    /// Every place content with this hash has been seen
    Paths {
        value: String,
        hash_type: String,

        #[arg(long)]
        json: bool,
    },

    /// Observation history of one object
    History {
        remote: String,
        path: String,

        #[arg(long)]
        json: bool,
    },

    /// Remotes in the catalog
    Remotes {
        #[arg(long)]
        json: bool,
    },

    /// Catalog row counts
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: cli::config::ConfigCommand,
    },
}

async fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = cli.settings;
    match cli.command {
        Commands::Scan {
            remote,
            path,
            no_recursive,
            json,
        } => {
            cli::scan::run(cli::scan::ScanArgs {
                config: settings.resolve()?,
                remote,
                path,
                recursive: !no_recursive,
                json,
            })
            .await
        }
        Commands::List {
            remote,
            path,
            recursive,
            json,
        } => cli::list::run(&settings.resolve()?, &remote, &path, recursive, json)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::ResolveHash { value, hash_type } => {
            let db = settings.open_catalog().await?;
            cli::query::resolve_hash(&db, &value, &hash_type).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Holders {
            value,
            hash_type,
            json,
        } => {
            let db = settings.open_catalog().await?;
            cli::query::holders(&db, &value, &hash_type, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Paths {
            value,
            hash_type,
            json,
        } => {
            let db = settings.open_catalog().await?;
            cli::query::paths(&db, &value, &hash_type, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { remote, path, json } => {
            let db = settings.open_catalog().await?;
            cli::query::history(&db, &remote, &path, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Remotes { json } => {
            let db = settings.open_catalog().await?;
            cli::query::remotes(&db, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats { json } => {
            let db = settings.open_catalog().await?;
            cli::query::stats(&db, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { command } => {
            cli::config::run(&settings, command)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "filesprawl",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {err:#}");
    }

    match run_command(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}
