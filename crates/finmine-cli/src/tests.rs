//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use finmine_core::{AnomalyType, EntityType, SkipReason};
use tempfile::TempDir;

use crate::commands::{self, truncate, Session};

fn setup_session() -> (TempDir, Session) {
    let dir = TempDir::new().unwrap();
    let session = Session::new(Some(dir.path()), None).unwrap();
    (dir, session)
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ========== Session Tests ==========

#[test]
fn test_session_uses_defaults_without_config() {
    let (dir, session) = setup_session();
    assert_eq!(session.data_dir, dir.path());
    assert_eq!(session.config, finmine_core::EngineConfig::default());
}

#[test]
fn test_session_reads_config_from_data_dir() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    write(
        &dir.path().join("config"),
        "engine.toml",
        &finmine_core::config::DEFAULT_CONFIG.replace(
            "large_amount_threshold = 10000.0",
            "large_amount_threshold = 500.0",
        ),
    );

    let session = Session::new(Some(dir.path()), None).unwrap();
    assert_eq!(session.config.suspicious.large_amount_threshold, 500.0);
}

#[test]
fn test_session_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = write(
        dir.path(),
        "bad.toml",
        "[temporal]\nbusiness_start_hour = 18\nbusiness_end_hour = 9\n",
    );

    assert!(Session::new(Some(dir.path()), Some(&config)).is_err());
}

#[test]
fn test_session_missing_explicit_config_is_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(Session::new(Some(dir.path()), Some(&missing)).is_err());
}

// ========== Analyze Command Tests ==========

#[tokio::test]
async fn test_analyze_files_links_transfers() {
    let (dir, session) = setup_session();
    let doc = write(
        dir.path(),
        "transfer.txt",
        "Account A001 paid $20 to account B002 on 2024-06-10",
    );

    let report = commands::analyze_files(&session, &[doc], Some(2024))
        .await
        .unwrap();

    assert!(report.manifest.failed.is_empty());
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.documents[0].transactions.len(), 1);
    assert!(report.graph.nodes.iter().any(|n| n.node_id == "A001"));
}

#[tokio::test]
async fn test_analyze_files_keeps_going_past_bad_units() {
    let (dir, session) = setup_session();
    let good = write(
        dir.path(),
        "good.txt",
        "2024-03-05 23:40，客户在东京通过账户6222021234567890123转账15000元到账户6222029876543210987。",
    );
    let bad_json = write(
        dir.path(),
        "bad.json",
        r#"{"text": "A001", "entities": [{"text": "A001", "label": "ACCOUNT", "start_pos": 3, "end_pos": 1}]}"#,
    );
    let missing = dir.path().join("missing.txt");

    let report = commands::analyze_files(&session, &[good, bad_json, missing], None)
        .await
        .unwrap();

    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.manifest.failed.len(), 2);
    assert!(report
        .manifest
        .failed
        .iter()
        .any(|f| f.unit.ends_with("bad.json")));
    assert!(report
        .anomalies()
        .any(|a| a.anomaly_type == AnomalyType::LargeAmountTransaction));
}

#[tokio::test]
async fn test_analyze_json_document_uses_given_entities() {
    let (dir, session) = setup_session();
    let doc = write(
        dir.path(),
        "tagged.json",
        r#"{"id": "tagged", "text": "本期LPR下调",
            "entities": [{"text": "LPR", "type": "TERM", "start": 2, "end": 5}]}"#,
    );

    let report = commands::analyze_files(&session, &[doc], None).await.unwrap();
    assert_eq!(report.documents[0].id, "tagged");
    assert_eq!(report.documents[0].entities.len(), 1);
    assert_eq!(report.documents[0].entities[0].entity_type, EntityType::Term);
}

#[tokio::test]
async fn test_analyze_files_persists_pattern_matches() {
    let (dir, session) = setup_session();
    let (text, original, corrected) = write_feedback_inputs(dir.path());
    commands::submit_feedback(&session, &text, &original, &corrected, 0.5).unwrap();

    let doc = write(dir.path(), "rates.txt", "下月LPR或将继续下调");
    commands::analyze_files(&session, &[doc], None).await.unwrap();

    let store = Session::new(Some(dir.path()), None)
        .unwrap()
        .load_patterns()
        .unwrap();
    let terms = commands::list_patterns(&store, Some("TERM"), true);
    assert!(terms.iter().any(|p| p.matches > 0));
}

#[tokio::test]
async fn test_analyze_files_without_patterns_writes_no_state() {
    let (dir, session) = setup_session();
    let doc = write(dir.path(), "plain.txt", "Account A001 paid $20 to account B002");
    commands::analyze_files(&session, &[doc], None).await.unwrap();
    assert!(!dir.path().join("entity_patterns.json").exists());
}

// ========== Ingest Command Tests ==========

#[test]
fn test_ingest_csv_reports_bursts_and_bad_rows() {
    let (dir, session) = setup_session();
    let csv = write(
        dir.path(),
        "tx.csv",
        "AccountID,TransactionAmount,TransactionDate,TransactionType,Location,DeviceID
A001,120.00,2024-06-10 10:00,transfer,Tokyo,D-1
A001,80.00,2024-06-10 10:02,transfer,Tokyo,D-1
A001,95.50,2024-06-10 10:05,transfer,Tokyo,D-1
A002,abc,2024-06-10 11:00,transfer,London,D-2
",
    );

    let report = commands::ingest_csv(&session, &csv).unwrap();

    assert_eq!(report.suspicious.len(), 1);
    assert_eq!(
        report.suspicious[0].anomaly_type,
        AnomalyType::HighFrequencyTransfer
    );
    assert_eq!(report.manifest.skipped.len(), 1);
    assert_eq!(report.manifest.skipped[0].reason, SkipReason::InvalidRecord);
}

#[test]
fn test_ingest_csv_missing_file() {
    let (dir, session) = setup_session();
    let result = commands::ingest_csv(&session, &dir.path().join("none.csv"));
    assert!(result.is_err());
}

#[test]
fn test_ingest_csv_missing_required_column() {
    let (dir, session) = setup_session();
    let csv = write(dir.path(), "tx.csv", "account_id,timestamp\nA001,2024-06-10\n");
    assert!(commands::ingest_csv(&session, &csv).is_err());
}

// ========== Feedback Command Tests ==========

fn write_feedback_inputs(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let text = write(dir, "doc.txt", "本期LPR下调至3.45%");
    let original = write(
        dir,
        "original.json",
        r#"[{"text": "3.45%", "type": "PERCENT", "start": 8, "end": 13}]"#,
    );
    let corrected = write(
        dir,
        "corrected.json",
        r#"[{"text": "LPR", "label": "TERM", "start_pos": 2, "end_pos": 5},
            {"text": "3.45%", "type": "PERCENT", "start": 8, "end": 13}]"#,
    );
    (text, original, corrected)
}

#[test]
fn test_feedback_persists_learning_state() {
    let (dir, session) = setup_session();
    let (text, original, corrected) = write_feedback_inputs(dir.path());

    let outcome = commands::submit_feedback(&session, &text, &original, &corrected, 0.5).unwrap();
    assert_eq!(outcome.additions, 1);
    assert!(outcome.patterns_created > 0);

    assert!(dir.path().join("entity_patterns.json").exists());
    assert!(dir.path().join("pattern_weights.json").exists());
    assert!(dir.path().join("feedback_history.json").exists());

    // A new session sees the saved state
    let session = Session::new(Some(dir.path()), None).unwrap();
    let report = commands::performance_report(&session).unwrap().unwrap();
    assert_eq!(report.feedback_count, 1);
    assert_eq!(report.average_accuracy, 0.5);

    let store = session.load_patterns().unwrap();
    let terms = commands::list_patterns(&store, Some("term"), true);
    assert!(!terms.is_empty());
    assert!(terms.iter().all(|p| p.entity_type == EntityType::Term));
    assert!(commands::list_patterns(&store, Some("MONEY"), true).is_empty());
}

#[test]
fn test_feedback_rejects_malformed_entities() {
    let (dir, session) = setup_session();
    let (text, original, _) = write_feedback_inputs(dir.path());
    let corrected = write(dir.path(), "bad.json", r#"{"not": "a list"}"#);

    assert!(commands::submit_feedback(&session, &text, &original, &corrected, 0.1).is_err());
    assert!(!dir.path().join("feedback_history.json").exists());
}

#[test]
fn test_feedback_rejects_negative_processing_time() {
    let (dir, session) = setup_session();
    let (text, original, corrected) = write_feedback_inputs(dir.path());
    assert!(commands::submit_feedback(&session, &text, &original, &corrected, -1.0).is_err());
}

#[test]
fn test_cmd_report_without_feedback() {
    let (_dir, session) = setup_session();
    assert!(commands::performance_report(&session).unwrap().is_none());
    assert!(commands::cmd_report(&session, false).is_ok());
    assert!(commands::cmd_report(&session, true).is_ok());
}

#[test]
fn test_cmd_patterns_on_empty_state() {
    let (_dir, session) = setup_session();
    assert!(commands::cmd_patterns(&session, None, false).is_ok());
    assert!(commands::cmd_patterns(&session, Some("ACCOUNT"), true).is_ok());
}

// ========== Parse Time Tests ==========

#[test]
fn test_cmd_parse_time() {
    assert!(commands::cmd_parse_time("2024年3月5日").is_ok());
    assert!(commands::cmd_parse_time("2024-03-05 14:30").is_ok());
    assert!(commands::cmd_parse_time("not a date").is_err());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("ACCOUNT", 10), "ACCOUNT");
    assert_eq!(truncate("TRANSACTION_TYPE", 10), "TRANSAC...");
    assert_eq!(truncate("深圳前海微众银行股份有限公司", 8), "深圳前海微...");
}
