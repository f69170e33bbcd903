//! List command - dump a remote listing without touching the catalog

use crate::cli::output::{format_optional_time, format_size, print_json, print_table};
use anyhow::{Context, Result};
use filesprawl_db::ObjectDescriptor;
use filesprawl_scan::{Listing, ListingSource, RcClient, ScanConfig};
use std::sync::Arc;

pub async fn run(
    config: &ScanConfig,
    remote: &str,
    path: &str,
    recursive: bool,
    json: bool,
) -> Result<()> {
    let client: Arc<dyn ListingSource> =
        Arc::new(RcClient::new(&config.rc).context("Failed to create rc client")?);

    let descriptors = Listing::new(client, remote, path, config.list_options(), recursive)
        .collect()
        .await
        .with_context(|| format!("Failed to list {remote}{path}"))?;

    if json {
        return print_json(&descriptors);
    }

    if descriptors.is_empty() {
        println!("Nothing found under {remote}{path}");
        return Ok(());
    }

    let rows = descriptors
        .iter()
        .map(|d| row(d, &config.hash_types))
        .collect();
    print_table(&["PATH", "SIZE", "MODIFIED", "HASH"], rows);
    Ok(())
}

fn row(descriptor: &ObjectDescriptor, hash_types: &[String]) -> Vec<String> {
    let path = if descriptor.is_dir {
        format!("{}/", descriptor.path)
    } else {
        descriptor.path.clone()
    };
    let size = if descriptor.is_dir {
        "-".to_string()
    } else {
        format_size(descriptor.size)
    };
    let hash = descriptor
        .preferred_hash(hash_types)
        .map(|h| h.to_string())
        .unwrap_or_default();

    vec![path, size, format_optional_time(descriptor.mod_time), hash]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_rows() {
        let mut hashes = BTreeMap::new();
        hashes.insert("dropbox".to_string(), "9a0b".to_string());
        let file = ObjectDescriptor {
            id: None,
            is_dir: false,
            mime_type: None,
            mod_time: None,
            name: "notes.txt".to_string(),
            path: "rollbar/notes.txt".to_string(),
            size: 2048,
            hashes,
            metadata: None,
        };
        let prefs = vec!["md5".to_string(), "dropbox".to_string()];

        assert_eq!(
            row(&file, &prefs),
            vec!["rollbar/notes.txt", "2.0 KB", "-", "dropbox:9a0b"]
        );

        let dir = ObjectDescriptor {
            is_dir: true,
            size: -1,
            path: "rollbar/photos".to_string(),
            hashes: BTreeMap::new(),
            ..file
        };
        assert_eq!(row(&dir, &prefs), vec!["rollbar/photos/", "-", "-", ""]);
    }
}
