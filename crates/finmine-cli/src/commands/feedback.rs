//! Learning commands: submit corrections, show performance

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use finmine_core::{Entity, LearnOutcome, PerformanceReport, RawEntity};
use tracing::info;

use super::Session;

/// Read a JSON list of entity records (`type`/`label`, `start`/`start_pos` spellings)
pub fn read_entities(path: &Path) -> Result<Vec<Entity>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: Vec<RawEntity> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON entity list", path.display()))?;

    raw.into_iter()
        .map(|r| {
            r.into_entity()
                .with_context(|| format!("Invalid entity in {}", path.display()))
        })
        .collect()
}

pub fn cmd_feedback(
    session: &Session,
    text_path: &Path,
    original_path: &Path,
    corrected_path: &Path,
    processing_time: f64,
) -> Result<()> {
    let outcome = submit_feedback(
        session,
        text_path,
        original_path,
        corrected_path,
        processing_time,
    )?;

    println!("📝 Feedback recorded");
    println!("   Additions: {}", outcome.additions);
    println!("   Corrections: {}", outcome.corrections);
    println!("   Removals: {}", outcome.removals);
    println!(
        "   Patterns: {} created, {} reinforced, {} penalized",
        outcome.patterns_created, outcome.patterns_reinforced, outcome.patterns_penalized
    );

    Ok(())
}

/// Learn from one correction and persist patterns and history
pub fn submit_feedback(
    session: &Session,
    text_path: &Path,
    original_path: &Path,
    corrected_path: &Path,
    processing_time: f64,
) -> Result<LearnOutcome> {
    let text = fs::read_to_string(text_path)
        .with_context(|| format!("Failed to read {}", text_path.display()))?;
    let original = read_entities(original_path)?;
    let corrected = read_entities(corrected_path)?;

    let store = session.load_patterns()?;
    let mut feedback = session.load_feedback(store.clone())?;
    let outcome = feedback
        .update_from_feedback(&text, &original, &corrected, processing_time)
        .context("Failed to apply feedback")?;

    session
        .state
        .save_patterns(&store)
        .context("Failed to save patterns")?;
    session
        .state
        .save_feedback(&feedback)
        .context("Failed to save feedback history")?;
    info!(
        "Saved learning state to {} ({} feedback records)",
        session.data_dir.display(),
        feedback.history().len()
    );

    Ok(outcome)
}

pub fn cmd_report(session: &Session, json: bool) -> Result<()> {
    let report = performance_report(session)?;

    let Some(report) = report else {
        println!("No feedback yet. Submit corrections with 'finmine feedback'.");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let trend = if report.accuracy_trend < 0.0 {
        "📉"
    } else {
        "📈"
    };
    println!("📊 Learning Performance");
    println!("   ─────────────────────────────");
    println!("   Feedback submitted: {}", report.feedback_count);
    println!("   Patterns learned: {}", report.total_patterns_learned);
    println!("   Accuracy: {:.1}%", report.average_accuracy * 100.0);
    println!("   Trend: {} {:+.4} per submission", trend, report.accuracy_trend);
    println!(
        "   Precision / Recall / F1: {:.2} / {:.2} / {:.2}",
        report.average_precision, report.average_recall, report.average_f1
    );
    println!(
        "   Avg processing time: {:.2}s",
        report.average_processing_time
    );

    Ok(())
}

pub fn performance_report(session: &Session) -> Result<Option<PerformanceReport>> {
    let feedback = session.load_feedback(session.load_patterns()?)?;
    Ok(feedback.get_performance_report())
}
