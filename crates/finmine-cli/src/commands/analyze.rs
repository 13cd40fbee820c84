//! Document analysis command
//!
//! Each file is one processing unit. Units run on the blocking pool and share
//! one pipeline (and so one transaction graph); a unit that fails is listed in
//! the manifest while the rest of the batch completes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use finmine_core::{BatchReport, DocumentInput, DocumentReport, Pipeline};
use tracing::info;

use super::Session;

pub async fn cmd_analyze(session: &Session, files: &[PathBuf], year: Option<i32>) -> Result<()> {
    let report = analyze_files(session, files, year).await?;

    info!(
        "Analyzed {} documents: {} anomalies, {} skipped, {} failed",
        report.documents.len(),
        report.anomalies().count(),
        report.manifest.skipped.len(),
        report.manifest.failed.len()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

pub async fn analyze_files(
    session: &Session,
    files: &[PathBuf],
    year: Option<i32>,
) -> Result<BatchReport> {
    let mut pipeline = session.pipeline(session.load_patterns()?)?;
    if let Some(year) = year {
        pipeline = pipeline.with_reference_year(year);
    }
    let pipeline = Arc::new(pipeline);

    let tasks: Vec<_> = files
        .iter()
        .map(|path| {
            let unit = path.display().to_string();
            let pipeline = Arc::clone(&pipeline);
            let path = path.clone();
            let handle = tokio::task::spawn_blocking(move || analyze_file(&pipeline, &path));
            (unit, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for (unit, handle) in tasks {
        let result = handle
            .await
            .with_context(|| format!("Worker for {} did not finish", unit))?;
        results.push((unit, result));
    }

    let report = pipeline.finish_batch(results);

    // Match counts from `enhance` are part of the learning state
    if !pipeline.patterns().is_empty() {
        session
            .state
            .save_patterns(pipeline.patterns())
            .context("Failed to save pattern match counts")?;
    }

    Ok(report)
}

/// Read one file as a document; `.json` files carry a pre-tagged `DocumentInput`
fn analyze_file(pipeline: &Pipeline, path: &Path) -> finmine_core::Result<DocumentReport> {
    let content = fs::read_to_string(path)?;

    let doc = if path.extension().is_some_and(|ext| ext == "json") {
        let mut doc: DocumentInput = serde_json::from_str(&content)?;
        if doc.id.is_empty() {
            doc.id = path.display().to_string();
        }
        doc
    } else {
        DocumentInput::new(path.display().to_string(), content)
    };

    pipeline.process_document(&doc)
}
