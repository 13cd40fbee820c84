//! Tabular transaction ingestion command

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use finmine_core::import::parse_rows;
use finmine_core::{BatchReport, Manifest};
use tracing::info;

use super::Session;

pub fn cmd_ingest(session: &Session, csv_path: &Path) -> Result<()> {
    let report = ingest_csv(session, csv_path)?;

    info!(
        "Graph has {} nodes, {} edges; {} suspicious patterns, {} rows skipped",
        report.graph.nodes.len(),
        report.graph.edges.len(),
        report.suspicious.len(),
        report.manifest.skipped.len()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

pub fn ingest_csv(session: &Session, csv_path: &Path) -> Result<BatchReport> {
    let file = File::open(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;
    let unit = csv_path.display().to_string();

    let import = parse_rows(file, &unit)
        .with_context(|| format!("Failed to read transactions from {}", csv_path.display()))?;
    info!("Parsed {} rows from {}", import.rows.len(), unit);

    let pipeline = session.pipeline(session.load_patterns()?)?;
    let mut manifest = Manifest {
        skipped: import.skipped,
        ..Default::default()
    };
    manifest
        .skipped
        .extend(pipeline.ingest_rows(&unit, &import.rows));

    Ok(pipeline.report(Vec::new(), manifest))
}
