//! Scan command - record a remote path into the catalog

use crate::cli::context::open_catalog;
use crate::cli::output::{format_time, print_json, print_table};
use anyhow::{Context, Result};
use filesprawl_scan::{
    CancellationToken, ListingSource, RcClient, ScanConfig, ScanPhase, ScanResult, Scanner,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

/// Arguments for the scan command
#[derive(Debug)]
pub struct ScanArgs {
    pub config: ScanConfig,
    pub remote: String,
    pub path: String,
    pub recursive: bool,
    pub json: bool,
}

/// Execute the scan command
pub async fn run(args: ScanArgs) -> Result<ExitCode> {
    let mut config = args.config;
    config.recursive = args.recursive;

    let db = open_catalog(&config).await?;
    let source: Arc<dyn ListingSource> =
        Arc::new(RcClient::new(&config.rc).context("Failed to create rc client")?);
    let scanner = Scanner::new(db.clone(), source, config);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping scan after in-flight writes");
                cancel.cancel();
            }
        })
    };

    let result = scanner.scan(&args.remote, &args.path, &cancel).await;
    interrupt.abort();
    db.close().await;

    let result = result.with_context(|| format!("Scan of {} did not start", args.remote))?;

    if args.json {
        print_json(&result)?;
    } else {
        print_summary(&result);
    }

    Ok(ExitCode::from(exit_status(&result)))
}

/// 0 on a clean run, 2 when some items failed, 1 when the scan failed.
fn exit_status(result: &ScanResult) -> u8 {
    match result.phase {
        ScanPhase::Completed if result.errors.is_empty() => 0,
        ScanPhase::Completed => 2,
        _ => 1,
    }
}

fn print_summary(result: &ScanResult) {
    let location = if result.path.is_empty() {
        result.remote.clone()
    } else {
        format!("{}{}", result.remote, result.path)
    };
    let stats = &result.stats;

    println!("Scan {} of {}", result.phase, location);
    println!("  Run:        {}", result.run_id);
    println!("  Observed:   {}", format_time(result.observed_at));
    println!(
        "  Objects:    {} seen, {} new, {} changed, {} unchanged",
        stats.seen, stats.created, stats.updated, stats.unchanged
    );
    if stats.listing_attempts > 1 {
        println!(
            "  Listing:    {} attempts, {} re-listed entries skipped",
            stats.listing_attempts, stats.skipped
        );
    }
    println!("  Duration:   {:.1}s", stats.duration_ms as f64 / 1000.0);

    if let Some(failure) = &result.failure {
        println!();
        println!("Failed ({}): {}", failure.kind, failure.message);
    }

    if !result.errors.is_empty() {
        println!();
        println!("{} item(s) could not be cataloged:", result.errors.len());
        let rows = result
            .errors
            .iter()
            .map(|e| {
                vec![
                    e.path.clone().unwrap_or_else(|| "?".to_string()),
                    e.kind.to_string(),
                    e.message.clone(),
                ]
            })
            .collect();
        print_table(&["PATH", "KIND", "ERROR"], rows);
    }
}
