use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ccl",
    version,
    about = "Local Commerce Control List extraction and query tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Query(QueryArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/ccl")]
    pub cache_root: PathBuf,

    /// eCFR bulk-data XML for the part being ingested.
    #[arg(long)]
    pub xml_path: PathBuf,

    /// Edition date of the document snapshot, YYYY-MM-DD.
    #[arg(long)]
    pub date: String,

    #[arg(long, default_value_t = 774)]
    pub part: u32,

    /// Target supplements; defaults to Supplement No. 1 (the CCL).
    #[arg(long = "supplement")]
    pub supplements: Vec<u32>,

    #[arg(long)]
    pub export_path: Option<PathBuf>,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Local Federal Register notice manifest to embed in the run manifest.
    #[arg(long)]
    pub fr_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value = ".cache/ccl")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Exact ECCN code to look up, e.g. 3B001 or 3B001.a.1.
    #[arg(long)]
    pub eccn: Option<String>,

    /// Full-text search over code, heading, and title.
    #[arg(long)]
    pub query: Option<String>,

    /// Snapshot edition date; defaults to the newest snapshot.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/ccl")]
    pub cache_root: PathBuf,
}
