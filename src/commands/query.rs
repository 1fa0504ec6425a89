use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, params};
use serde::Serialize;
use tracing::info;

use crate::cli::QueryArgs;

#[derive(Debug, Clone, Serialize)]
struct QueryResult {
    eccn: String,
    supplement: u32,
    category: String,
    group: String,
    heading: String,
    title: String,
    parent_eccn: Option<String>,
    breadcrumbs: Vec<String>,
    child_eccns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    snapshot_id: String,
    edition_date: String,
    returned: usize,
    results: Vec<QueryResult>,
}

pub fn run(args: QueryArgs) -> Result<()> {
    if args.eccn.is_none() && args.query.is_none() {
        bail!("either --eccn or --query is required");
    }

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("ccl_catalog.sqlite"));

    let connection = Connection::open_with_flags(
        &db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open database read-only: {}", db_path.display()))?;

    let (snapshot_id, edition_date) = resolve_snapshot(&connection, args.date.as_deref())?;
    info!(snapshot_id = %snapshot_id, edition_date = %edition_date, "querying catalog snapshot");

    let results = if let Some(eccn) = args.eccn.as_deref() {
        lookup_eccn(&connection, &snapshot_id, eccn.trim())?
    } else if let Some(query) = args.query.as_deref() {
        search_text(&connection, &snapshot_id, query.trim(), args.limit)?
    } else {
        Vec::new()
    };

    if args.json {
        write_json_response(&snapshot_id, &edition_date, results)
    } else {
        write_text_response(results)
    }
}

fn resolve_snapshot(connection: &Connection, date: Option<&str>) -> Result<(String, String)> {
    match date {
        Some(date) => {
            let snapshot = connection
                .query_row(
                    "SELECT snapshot_id, edition_date FROM snapshots WHERE edition_date = ?1",
                    [date],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .with_context(|| format!("no catalog snapshot for edition date {date}"))?;
            Ok(snapshot)
        }
        None => {
            let snapshot = connection
                .query_row(
                    "SELECT snapshot_id, edition_date FROM snapshots
                     ORDER BY edition_date DESC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .context("no catalog snapshots ingested yet")?;
            Ok(snapshot)
        }
    }
}

fn lookup_eccn(
    connection: &Connection,
    snapshot_id: &str,
    eccn: &str,
) -> Result<Vec<QueryResult>> {
    if eccn.is_empty() {
        bail!("--eccn must not be empty");
    }

    let mut statement = connection.prepare(
        "
        SELECT eccn, supplement, category, group_code, heading, title,
               parent_eccn, breadcrumbs, entry_json
        FROM eccns
        WHERE snapshot_id = ?1 AND eccn = ?2
        ",
    )?;

    let mut rows = statement.query(params![snapshot_id, eccn])?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(result_from_row(row)?);
    }
    Ok(results)
}

fn search_text(
    connection: &Connection,
    snapshot_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<QueryResult>> {
    if query.is_empty() {
        bail!("--query must not be empty");
    }

    let mut statement = connection.prepare(
        "
        SELECT e.eccn, e.supplement, e.category, e.group_code, e.heading, e.title,
               e.parent_eccn, e.breadcrumbs, e.entry_json
        FROM eccns_fts
        JOIN eccns e ON e.rowid = eccns_fts.rowid
        WHERE eccns_fts MATCH ?1 AND e.snapshot_id = ?2
        ORDER BY bm25(eccns_fts) ASC
        LIMIT ?3
        ",
    )?;

    let mut rows = statement.query(params![to_fts_query(query), snapshot_id, limit as i64])?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(result_from_row(row)?);
    }
    Ok(results)
}

fn result_from_row(row: &rusqlite::Row<'_>) -> Result<QueryResult> {
    let breadcrumbs_raw: String = row.get(7)?;
    let breadcrumbs: Vec<String> = serde_json::from_str(&breadcrumbs_raw)
        .context("failed to parse stored breadcrumbs")?;

    let entry_json: String = row.get(8)?;
    let child_eccns = child_eccns_from_entry(&entry_json)?;

    Ok(QueryResult {
        eccn: row.get(0)?,
        supplement: row.get(1)?,
        category: row.get(2)?,
        group: row.get(3)?,
        heading: row.get(4)?,
        title: row.get(5)?,
        parent_eccn: row.get(6)?,
        breadcrumbs,
        child_eccns,
    })
}

fn child_eccns_from_entry(entry_json: &str) -> Result<Vec<String>> {
    let entry: crate::model::EccnEntry =
        serde_json::from_str(entry_json).context("failed to parse stored catalog entry")?;
    Ok(entry.child_eccns)
}

/// Quote each token so codes like `3B001.a` survive FTS5 query syntax.
fn to_fts_query(query_text: &str) -> String {
    query_text
        .split_whitespace()
        .filter(|token| !token.trim().is_empty())
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .collect::<Vec<String>>()
        .join(" ")
}

fn write_json_response(
    snapshot_id: &str,
    edition_date: &str,
    results: Vec<QueryResult>,
) -> Result<()> {
    let response = QueryResponse {
        snapshot_id: snapshot_id.to_string(),
        edition_date: edition_date.to_string(),
        returned: results.len(),
        results,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize query json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(results: Vec<QueryResult>) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Results: {}", results.len())?;
    for result in &results {
        writeln!(
            output,
            "{}\tsupplement {}\t{}",
            result.eccn, result.supplement, result.title
        )?;
        if !result.breadcrumbs.is_empty() {
            writeln!(output, "\tbreadcrumbs: {}", result.breadcrumbs.join(" > "))?;
        }
        if let Some(parent) = &result.parent_eccn {
            writeln!(output, "\tparent: {parent}")?;
        }
        if !result.child_eccns.is_empty() {
            writeln!(output, "\tchildren: {}", result.child_eccns.join(", "))?;
        }
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_queries_quote_every_token() {
        assert_eq!(to_fts_query("3B001.a equipment"), "\"3B001.a\" \"equipment\"");
        assert_eq!(to_fts_query("say \"hi\""), "\"say\" \"hi\"");
    }
}
