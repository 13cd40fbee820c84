//! Finmine Core Library
//!
//! Entity, relation and anomaly mining for financial documents:
//! - Rule-based entity extraction with char offsets (CJK-safe)
//! - Adaptive pattern store that learns from user corrections
//! - Transfer relation extraction with a configurable direction policy
//! - Transaction graph of accounts, transactions and locations
//! - Off-hours detection across timezones
//! - High-frequency and large-amount transfer detection
//! - Feedback loop with rolling accuracy and precision/recall/F1
//! - Versioned JSON persistence of learning state

pub mod config;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod graph;
pub mod import;
pub mod models;
pub mod patterns;
pub mod persist;
pub mod pipeline;
pub mod relations;
pub mod suspicious;
pub mod temporal;
pub mod text;

pub use config::{
    DirectionPolicy, EngineConfig, LearningConfig, RelationConfig, SuspicionConfig,
    TemporalConfig,
};
pub use error::{Error, Result};
pub use extract::RuleExtractor;
pub use feedback::{FeedbackLoop, FeedbackRecord, PerformanceReport};
pub use graph::{GraphSnapshot, TransactionGraph, TransactionRow, EXTERNAL_ACCOUNT};
pub use models::{
    Anomaly, AnomalyEvidence, AnomalyType, Entity, EntityType, RawEntity, RawRelation, Relation,
    RelationType, SkipReason, SkippedItem,
};
pub use patterns::{LearnOutcome, Pattern, PatternKind, PatternStatistics, PatternStore};
pub use persist::StateStore;
pub use pipeline::{BatchReport, DocumentInput, DocumentReport, Manifest, Pipeline};
pub use relations::RelationExtractor;
pub use suspicious::SuspiciousPatternDetector;
pub use temporal::{parse_time, TemporalDetector, TimezoneTable};
