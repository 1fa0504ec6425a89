use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::IngestRunManifest;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let db_path = args.cache_root.join("ccl_catalog.sqlite");

    info!(cache_root = %args.cache_root.display(), "status requested");

    match newest_manifest_path(&manifest_dir)? {
        Some(path) => {
            let raw =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let manifest: IngestRunManifest = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;

            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                started_at = %manifest.started_at,
                part = manifest.source.part,
                edition_date = %manifest.source.edition_date,
                supplements = manifest.counts.supplements_located,
                eccns = manifest.counts.eccn_count,
                warnings = manifest.warnings.len(),
                "loaded latest ingest run manifest"
            );
        }
        None => {
            warn!(path = %manifest_dir.display(), "no ingest run manifests found");
        }
    }

    if db_path.exists() {
        let connection = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let snapshots = query_count(&connection, "SELECT COUNT(*) FROM snapshots").unwrap_or(0);
        let eccns = query_count(&connection, "SELECT COUNT(*) FROM eccns").unwrap_or(0);

        info!(
            path = %db_path.display(),
            snapshots,
            eccns,
            "catalog database status"
        );

        let mut statement = connection.prepare(
            "SELECT snapshot_id, edition_date, eccn_count FROM snapshots ORDER BY edition_date",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let snapshot_id: String = row.get(0)?;
            let edition_date: String = row.get(1)?;
            let eccn_count: i64 = row.get(2)?;
            info!(
                snapshot_id = %snapshot_id,
                edition_date = %edition_date,
                eccns = eccn_count,
                "snapshot"
            );
        }
    } else {
        warn!(path = %db_path.display(), "catalog database missing");
    }

    Ok(())
}

fn newest_manifest_path(manifest_dir: &std::path::Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();
        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("ingest_run_") && name.ends_with(".json"))
            .unwrap_or(false);
        if is_run_manifest {
            candidates.push(path);
        }
    }

    // Run manifests embed a sortable UTC timestamp in the filename.
    candidates.sort();
    Ok(candidates.pop())
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
