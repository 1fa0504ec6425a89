use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::model::{
    FederalRegisterDocument, IngestCounts, IngestPaths, IngestRunManifest, SourceDocument,
    Supplement,
};
use crate::parser::{self, ParseOptions};
use crate::util::{
    ensure_directory, now_utc_string, sha256_hex, utc_compact_string, write_json_pretty,
};

const DB_SCHEMA_VERSION: &str = "0.1.0";

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let edition_date = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d")
        .with_context(|| format!("invalid edition date (expected YYYY-MM-DD): {}", args.date))?;

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let export_path = args.export_path.clone().unwrap_or_else(|| {
        cache_root
            .join("exports")
            .join(format!("eccns_{edition_date}.json"))
    });
    let ingest_manifest_path = args.ingest_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "ingest_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("ccl_catalog.sqlite"));

    info!(
        cache_root = %cache_root.display(),
        run_id = %run_id,
        part = args.part,
        date = %edition_date,
        "starting ingest"
    );

    let xml = fs::read_to_string(&args.xml_path)
        .with_context(|| format!("failed to read {}", args.xml_path.display()))?;
    let source_sha256 = sha256_hex(&xml);

    let targets = target_supplements(&args.supplements);
    let options = ParseOptions {
        part: args.part,
        supplements: targets.clone(),
    };
    let parsed = parser::parse_part(&xml, &options)?;

    let mut warnings = Vec::new();
    let found: HashSet<u32> = parsed.iter().map(|supplement| supplement.number).collect();
    for target in &targets {
        if !found.contains(target) {
            let warning = format!("supplement {target} not found in part {}", args.part);
            warn!(warning = %warning, "target supplement missing");
            warnings.push(warning);
        }
    }

    write_json_pretty(&export_path, &parsed)?;
    info!(path = %export_path.display(), "wrote supplement export");

    let mut connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;

    let snapshot_id = snapshot_id_for(args.part, &edition_date.to_string());
    let entries_upserted = store_snapshot(
        &mut connection,
        &snapshot_id,
        args.part,
        &edition_date.to_string(),
        &source_sha256,
        &parsed,
    )?;
    sync_fts_index(&connection)?;

    let snapshots_total = count_rows(&connection, "SELECT COUNT(*) FROM snapshots")?;
    let eccns_total = count_rows(&connection, "SELECT COUNT(*) FROM eccns")?;

    let federal_register = load_fr_manifest(args.fr_manifest_path.as_deref())?;
    let eccn_count = parsed
        .iter()
        .map(|supplement| supplement.metadata.eccn_count)
        .sum();

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_ingest_command(&args),
        source: SourceDocument {
            xml_path: args.xml_path.display().to_string(),
            part: args.part,
            edition_date: edition_date.to_string(),
            sha256: source_sha256,
        },
        paths: IngestPaths {
            cache_root: cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            export_path: export_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts: IngestCounts {
            supplements_located: parsed.len(),
            eccn_count,
            entries_upserted,
            snapshots_total,
            eccns_total,
        },
        federal_register,
        warnings,
        notes: vec![
            "Ingest command completed against a local eCFR XML snapshot.".to_string(),
            "Catalog entries are keyed by (snapshot, eccn); re-ingesting a date replaces its rows."
                .to_string(),
        ],
    };

    write_json_pretty(&ingest_manifest_path, &manifest)?;

    info!(path = %ingest_manifest_path.display(), "wrote ingest run manifest");
    info!(
        supplements = parsed.len(),
        eccns = eccn_count,
        snapshots = snapshots_total,
        "ingest completed"
    );

    Ok(())
}

fn target_supplements(requested: &[u32]) -> Vec<u32> {
    if requested.is_empty() {
        // Supplement No. 1 is the Commerce Control List itself.
        return vec![1];
    }
    let mut targets = requested.to_vec();
    targets.sort_unstable();
    targets.dedup();
    targets
}

fn snapshot_id_for(part: u32, edition_date: &str) -> String {
    format!("part{part}-{edition_date}")
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS snapshots (
          snapshot_id TEXT PRIMARY KEY,
          part INTEGER NOT NULL,
          edition_date TEXT NOT NULL,
          source_sha256 TEXT NOT NULL,
          parsed_at TEXT NOT NULL,
          supplement_count INTEGER NOT NULL,
          eccn_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS eccns (
          snapshot_id TEXT NOT NULL,
          eccn TEXT NOT NULL,
          supplement INTEGER NOT NULL,
          category TEXT NOT NULL,
          group_code TEXT NOT NULL,
          heading TEXT NOT NULL,
          title TEXT NOT NULL,
          parent_eccn TEXT,
          breadcrumbs TEXT NOT NULL,
          entry_json TEXT NOT NULL,
          PRIMARY KEY (snapshot_id, eccn),
          FOREIGN KEY (snapshot_id) REFERENCES snapshots(snapshot_id)
        );
        ",
    )?;

    connection
        .execute(
            "
            CREATE VIRTUAL TABLE IF NOT EXISTS eccns_fts
            USING fts5(eccn, heading, title, content='eccns', content_rowid='rowid')
            ",
            [],
        )
        .context("failed to initialize FTS5 table eccns_fts")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

fn store_snapshot(
    connection: &mut Connection,
    snapshot_id: &str,
    part: u32,
    edition_date: &str,
    source_sha256: &str,
    supplements: &[Supplement],
) -> Result<usize> {
    let tx = connection.transaction()?;
    let mut inserted = 0usize;

    {
        let eccn_count: usize = supplements
            .iter()
            .map(|supplement| supplement.metadata.eccn_count)
            .sum();

        tx.execute(
            "
            INSERT INTO snapshots(
              snapshot_id, part, edition_date, source_sha256, parsed_at,
              supplement_count, eccn_count
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(snapshot_id) DO UPDATE SET
              part=excluded.part,
              edition_date=excluded.edition_date,
              source_sha256=excluded.source_sha256,
              parsed_at=excluded.parsed_at,
              supplement_count=excluded.supplement_count,
              eccn_count=excluded.eccn_count
            ",
            params![
                snapshot_id,
                part,
                edition_date,
                source_sha256,
                now_utc_string(),
                supplements.len(),
                eccn_count
            ],
        )?;

        tx.execute("DELETE FROM eccns WHERE snapshot_id = ?1", [snapshot_id])?;

        let mut statement = tx.prepare(
            "
            INSERT INTO eccns(
              snapshot_id, eccn, supplement, category, group_code,
              heading, title, parent_eccn, breadcrumbs, entry_json
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )?;

        for supplement in supplements {
            for entry in &supplement.eccns {
                let breadcrumbs = serde_json::to_string(&entry.breadcrumbs)
                    .context("failed to serialize breadcrumbs")?;
                let entry_json =
                    serde_json::to_string(entry).context("failed to serialize catalog entry")?;

                statement.execute(params![
                    snapshot_id,
                    &entry.eccn,
                    supplement.number,
                    &entry.category,
                    &entry.group,
                    &entry.heading,
                    &entry.title,
                    entry.parent_eccn.as_deref(),
                    breadcrumbs,
                    entry_json
                ])?;
                inserted += 1;
            }
        }
    }

    tx.commit()?;
    Ok(inserted)
}

fn sync_fts_index(connection: &Connection) -> Result<()> {
    connection
        .execute("INSERT INTO eccns_fts(eccns_fts) VALUES('rebuild')", [])
        .context("failed to rebuild FTS index")?;
    Ok(())
}

fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

fn load_fr_manifest(path: Option<&Path>) -> Result<Vec<FederalRegisterDocument>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let documents: Vec<FederalRegisterDocument> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    info!(
        path = %path.display(),
        documents = documents.len(),
        "loaded federal register manifest"
    );
    Ok(documents)
}

fn render_ingest_command(args: &IngestArgs) -> String {
    let mut command = vec![
        "ccl".to_string(),
        "ingest".to_string(),
        "--cache-root".to_string(),
        args.cache_root.display().to_string(),
        "--xml-path".to_string(),
        args.xml_path.display().to_string(),
        "--date".to_string(),
        args.date.clone(),
        "--part".to_string(),
        args.part.to_string(),
    ];

    for supplement in &args.supplements {
        command.push("--supplement".to_string());
        command.push(supplement.to_string());
    }
    if let Some(path) = &args.export_path {
        command.push("--export-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.ingest_manifest_path {
        command.push("--ingest-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.db_path {
        command.push("--db-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.fr_manifest_path {
        command.push("--fr-manifest-path".to_string());
        command.push(path.display().to_string());
    }

    command.join(" ")
}
