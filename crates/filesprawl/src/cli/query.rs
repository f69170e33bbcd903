//! Catalog query commands

use crate::cli::output::{format_optional_time, format_size, format_time, print_json, print_table};
use anyhow::{Context, Result};
use filesprawl_db::{CatalogDb, ContentHash, DbError};

fn parse_hash(value: &str, hash_type: &str) -> Result<ContentHash> {
    ContentHash::new(value, hash_type).context("Invalid content hash")
}

pub async fn resolve_hash(db: &CatalogDb, value: &str, hash_type: &str) -> Result<()> {
    match db.resolve_hash(value, hash_type).await {
        Ok(id) => {
            println!("{id}");
            Ok(())
        }
        Err(DbError::NotFound(_)) => {
            anyhow::bail!("{hash_type}:{value} has never been seen on any remote")
        }
        Err(err) => Err(err).context("Failed to resolve hash"),
    }
}

pub async fn holders(db: &CatalogDb, value: &str, hash_type: &str, json: bool) -> Result<()> {
    let hash = parse_hash(value, hash_type)?;
    let holders = db
        .remotes_holding(&hash)
        .await
        .context("Failed to query holders")?;

    if json {
        return print_json(&holders);
    }
    if holders.is_empty() {
        println!("No remote currently holds {hash}");
        return Ok(());
    }

    let rows = holders
        .into_iter()
        .map(|h| vec![h.remote, h.path, format_time(h.observed_at)])
        .collect();
    print_table(&["REMOTE", "PATH", "LAST SEEN"], rows);
    Ok(())
}

pub async fn paths(db: &CatalogDb, value: &str, hash_type: &str, json: bool) -> Result<()> {
    let hash = parse_hash(value, hash_type)?;
    let locations = db
        .paths_for_hash(&hash)
        .await
        .context("Failed to query paths")?;

    if json {
        return print_json(&locations);
    }
    if locations.is_empty() {
        println!("{hash} has never been seen");
        return Ok(());
    }

    let rows = locations
        .into_iter()
        .map(|l| {
            vec![
                l.remote,
                l.path,
                format_time(l.first_observed_at),
                format_time(l.last_observed_at),
            ]
        })
        .collect();
    print_table(&["REMOTE", "PATH", "FIRST SEEN", "LAST SEEN"], rows);
    Ok(())
}

pub async fn history(db: &CatalogDb, remote: &str, path: &str, json: bool) -> Result<()> {
    let object = db
        .get_object(remote, path)
        .await
        .context("Failed to look up object")?
        .with_context(|| format!("{remote}{path} is not in the catalog"))?;
    let history = db
        .object_history(remote, path)
        .await
        .context("Failed to query history")?;

    if json {
        return print_json(&serde_json::json!({
            "object": object,
            "history": history,
        }));
    }

    println!("{}{}", remote, object.path);
    println!(
        "  {} {}, modified {}",
        if object.is_dir { "directory" } else { "file" },
        format_size(object.size),
        format_optional_time(object.mod_time)
    );
    println!(
        "  first seen {}, last seen {}",
        format_time(object.first_seen_at),
        format_time(object.last_seen_at)
    );

    let rows = history
        .into_iter()
        .map(|entry| {
            vec![
                format_time(entry.event.observed_at),
                entry.event.run_id.to_string(),
                entry.hash.map(|h| h.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["OBSERVED", "RUN", "HASH"], rows);
    Ok(())
}

pub async fn remotes(db: &CatalogDb, json: bool) -> Result<()> {
    let remotes = db.list_remotes().await.context("Failed to list remotes")?;

    if json {
        return print_json(&remotes);
    }
    let rows = remotes
        .into_iter()
        .map(|r| vec![r.name, format_time(r.created_at)])
        .collect();
    print_table(&["REMOTE", "FIRST SCANNED"], rows);
    Ok(())
}

pub async fn stats(db: &CatalogDb, json: bool) -> Result<()> {
    let stats = db.catalog_stats().await.context("Failed to read catalog stats")?;

    if json {
        return print_json(&stats);
    }
    println!("Remotes:  {}", stats.remotes);
    println!("Hashes:   {}", stats.hashes);
    println!("Objects:  {}", stats.objects);
    println!("Events:   {}", stats.events);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filesprawl_db::{ObjectDescriptor, ScanStamp};
    use std::collections::BTreeMap;

    async fn seeded() -> CatalogDb {
        let db = CatalogDb::open_memory().await.unwrap();
        let mut hashes = BTreeMap::new();
        hashes.insert("md5".to_string(), "872f92f3".to_string());
        let descriptor = ObjectDescriptor {
            id: None,
            is_dir: false,
            mime_type: None,
            mod_time: None,
            name: "notes.txt".to_string(),
            path: "rollbar/notes.txt".to_string(),
            size: 1024,
            hashes,
            metadata: None,
        };
        let hash = descriptor.preferred_hash(&["md5".to_string()]).unwrap();
        let id = db.get_or_create_hash(&hash).await.unwrap();
        db.record("dbox:", &descriptor, Some(id), &ScanStamp::now())
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_queries_run_against_seeded_catalog() {
        let db = seeded().await;

        resolve_hash(&db, "872f92f3", "md5").await.unwrap();
        holders(&db, "872f92f3", "md5", true).await.unwrap();
        paths(&db, "872f92f3", "md5", false).await.unwrap();
        history(&db, "dbox:", "rollbar/notes.txt", false).await.unwrap();
        remotes(&db, false).await.unwrap();
        stats(&db, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_hash_and_object_are_errors() {
        let db = seeded().await;

        let err = resolve_hash(&db, "ffff", "md5").await.unwrap_err();
        assert!(err.to_string().contains("never been seen"));

        assert!(history(&db, "dbox:", "missing.txt", false).await.is_err());
        assert!(holders(&db, "", "md5", false).await.is_err());
    }
}
