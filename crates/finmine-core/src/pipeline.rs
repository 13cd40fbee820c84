//! Document pipeline
//!
//! One document is one processing unit:
//!
//! 1. Rule extraction (or the caller's pre-tagged entities)
//! 2. Pattern enhancement
//! 3. Relation extraction (or the caller's relations)
//! 4. Graph ingestion
//! 5. Off-hours detection
//!
//! Data problems inside a unit become skipped items. A structural fault
//! (`InvariantViolation`) aborts that unit only; the batch records it as failed
//! and carries on. Suspicious-pattern detection runs once over the shared
//! graph when the batch is assembled.
//!
//! `Pipeline` is `Send + Sync`, so documents can be processed on worker
//! threads sharing one instance.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::extract::RuleExtractor;
use crate::graph::{skip_reason, GraphSnapshot, TransactionGraph, TransactionRow};
use crate::models::{Anomaly, Entity, RawEntity, RawRelation, Relation, SkipReason, SkippedItem};
use crate::patterns::PatternStore;
use crate::relations::RelationExtractor;
use crate::suspicious::SuspiciousPatternDetector;
use crate::temporal::TemporalDetector;

/// Unit name used for graph-wide findings
const GRAPH_UNIT: &str = "graph";

/// A document to analyze
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentInput {
    /// Unit name in reports; callers fill in a file name when empty
    #[serde(default)]
    pub id: String,
    pub text: String,
    /// Pre-tagged entities; when absent the rule extractor runs
    #[serde(default)]
    pub entities: Option<Vec<RawEntity>>,
    /// Pre-extracted relations; when absent the relation extractor runs
    #[serde(default)]
    pub relations: Option<Vec<RawRelation>>,
}

impl DocumentInput {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entities: None,
            relations: None,
        }
    }
}

/// Per-document output
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentReport {
    pub id: String,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    /// Off-hours anomalies found in this document
    pub anomalies: Vec<Anomaly>,
    /// Transaction ids recorded in the graph
    pub transactions: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub unit: String,
    pub error: String,
}

/// Everything that was skipped or failed during a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    pub skipped: Vec<SkippedItem>,
    pub failed: Vec<FailedUnit>,
}

/// Partial results of a batch plus its manifest
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    /// High-frequency and large-amount anomalies over the whole graph
    pub suspicious: Vec<Anomaly>,
    pub graph: GraphSnapshot,
    pub manifest: Manifest,
}

impl BatchReport {
    /// Every anomaly in the batch, document anomalies first
    pub fn anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.documents
            .iter()
            .flat_map(|d| d.anomalies.iter())
            .chain(self.suspicious.iter())
    }
}

pub struct Pipeline {
    extractor: RuleExtractor,
    relations: RelationExtractor,
    temporal: TemporalDetector,
    suspicious: SuspiciousPatternDetector,
    patterns: Arc<PatternStore>,
    graph: Mutex<TransactionGraph>,
}

impl Pipeline {
    pub fn new(config: &EngineConfig, patterns: Arc<PatternStore>) -> Result<Self> {
        Ok(Self {
            extractor: RuleExtractor::from_config(&config.temporal)?,
            relations: RelationExtractor::new(config.relations.clone())?,
            temporal: TemporalDetector::new(config.temporal.clone()),
            suspicious: SuspiciousPatternDetector::new(config.suspicious.clone()),
            patterns,
            graph: Mutex::new(TransactionGraph::new()),
        })
    }

    /// Pin the year used for month-day dates
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.temporal = self.temporal.with_reference_year(year);
        self
    }

    pub fn patterns(&self) -> &Arc<PatternStore> {
        &self.patterns
    }

    fn graph(&self) -> MutexGuard<'_, TransactionGraph> {
        self.graph.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one document through the pipeline
    pub fn process_document(&self, doc: &DocumentInput) -> Result<DocumentReport> {
        let unit = doc.id.as_str();

        let base = match &doc.entities {
            Some(raw) => raw
                .iter()
                .cloned()
                .map(RawEntity::into_entity)
                .collect::<Result<Vec<_>>>()?,
            None => self.extractor.extract(&doc.text),
        };
        let entities = self.patterns.enhance(&doc.text, &base);

        let relations = match &doc.relations {
            Some(raw) => raw
                .iter()
                .cloned()
                .map(RawRelation::into_relation)
                .collect::<Result<Vec<_>>>()?,
            None => self.relations.extract(&doc.text, &entities),
        };

        let ingest = self.graph().ingest_relations(unit, &relations, &entities)?;
        let scan = self.temporal.detect_time_anomalies(unit, &entities, &doc.text);

        let mut skipped = ingest.skipped;
        skipped.extend(scan.skipped);

        info!(
            "Processed {}: {} entities ({} from patterns), {} relations, {} anomalies",
            unit,
            entities.len(),
            entities.len() - base.len(),
            relations.len(),
            scan.anomalies.len()
        );

        Ok(DocumentReport {
            id: doc.id.clone(),
            entities,
            relations,
            anomalies: scan.anomalies,
            transactions: ingest.transactions,
            skipped,
        })
    }

    /// Add tabular rows to the graph; rows the graph rejects are skipped
    pub fn ingest_rows(&self, unit: &str, rows: &[(usize, TransactionRow)]) -> Vec<SkippedItem> {
        let mut graph = self.graph();
        let mut skipped = Vec::new();

        for (line, row) in rows {
            if let Err(e) = graph.ingest_row(row) {
                let reason = skip_reason(&e);
                warn!("Skipping row {}:{}: {}", unit, line, e);
                skipped.push(SkippedItem::new(
                    unit,
                    format!("{}:{}", unit, line),
                    reason,
                    e.to_string(),
                ));
            }
        }

        info!("Ingested {} rows from {}", rows.len() - skipped.len(), unit);
        skipped
    }

    /// Run the suspicious-pattern detectors and snapshot the graph
    ///
    /// Transactions failing the integrity check are excluded from detection
    /// and listed as skipped.
    pub fn report(&self, documents: Vec<DocumentReport>, mut manifest: Manifest) -> BatchReport {
        let graph = self.graph();

        for issue in graph.integrity_issues() {
            warn!("Excluding {}", issue);
            manifest.skipped.push(SkippedItem::new(
                GRAPH_UNIT,
                issue.transaction_id.clone(),
                SkipReason::GraphIntegrity,
                issue.to_string(),
            ));
        }

        let suspicious = self.suspicious.detect_all(&graph);
        info!(
            "Batch: {} documents, {} failed, {} skipped items, {} suspicious patterns",
            documents.len(),
            manifest.failed.len(),
            manifest.skipped.len(),
            suspicious.len()
        );

        BatchReport {
            documents,
            suspicious,
            graph: graph.snapshot(),
            manifest,
        }
    }

    /// Assemble per-document results into a batch report
    pub fn finish_batch(&self, results: Vec<(String, Result<DocumentReport>)>) -> BatchReport {
        let mut documents = Vec::new();
        let mut manifest = Manifest::default();

        for (unit, result) in results {
            match result {
                Ok(report) => {
                    manifest.skipped.extend(report.skipped.iter().cloned());
                    documents.push(report);
                }
                Err(e) => {
                    if e.is_fatal() {
                        error!("Aborted unit {}: {}", unit, e);
                    } else {
                        warn!("Unit {} failed: {}", unit, e);
                    }
                    manifest.failed.push(FailedUnit {
                        unit,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.report(documents, manifest)
    }

    /// Process documents in order on the current thread
    pub fn run_batch(&self, docs: &[DocumentInput]) -> BatchReport {
        let results = docs
            .iter()
            .map(|doc| (doc.id.clone(), self.process_document(doc)))
            .collect();
        self.finish_batch(results)
    }
}
