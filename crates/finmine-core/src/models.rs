//! Domain models for finmine
//!
//! `Entity` and `Relation` are the canonical shapes used inside the engine.
//! External records (pre-tagged NER output, JSON corrections) enter through
//! `RawEntity` / `RawRelation`, which are converted exactly once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Open key/value extension map carried by entities, relations and edges
pub type Metadata = BTreeMap<String, String>;

/// Entity labels
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Org,
    Money,
    Percent,
    Date,
    Time,
    Location,
    Geo,
    Product,
    Event,
    Email,
    Phone,
    Id,
    Bank,
    Account,
    TransactionType,
    Term,
    /// Label produced by an external recognizer that we don't model
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Money => "MONEY",
            Self::Percent => "PERCENT",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Location => "LOCATION",
            Self::Geo => "GEO",
            Self::Product => "PRODUCT",
            Self::Event => "EVENT",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Id => "ID",
            Self::Bank => "BANK",
            Self::Account => "ACCOUNT",
            Self::TransactionType => "TRANSACTION_TYPE",
            Self::Term => "TERM",
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PERSON" => Self::Person,
            "ORG" | "ORGANIZATION" | "COMPANY" => Self::Org,
            "MONEY" => Self::Money,
            "PERCENT" => Self::Percent,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "LOCATION" => Self::Location,
            "GEO" | "GPE" => Self::Geo,
            "PRODUCT" => Self::Product,
            "EVENT" => Self::Event,
            "EMAIL" => Self::Email,
            "PHONE" => Self::Phone,
            "ID" => Self::Id,
            "BANK" => Self::Bank,
            "ACCOUNT" => Self::Account,
            "TRANSACTION_TYPE" => Self::TransactionType,
            "TERM" => Self::Term,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.as_str().to_string()
    }
}

impl std::str::FromStr for EntityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed, positioned span of text
///
/// Offsets are char offsets into the chunk that produced the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Entity {
    /// Create an entity, rejecting spans with `start > end`
    pub fn new(
        text: impl Into<String>,
        entity_type: EntityType,
        start: usize,
        end: usize,
    ) -> Result<Self> {
        let entity = Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            entity_type,
            start,
            end,
            confidence: 1.0,
            metadata: Metadata::new(),
        };
        entity.validate()?;
        Ok(entity)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::InvariantViolation(format!(
                "entity '{}' has start {} > end {}",
                self.text, self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn span(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    /// Same text and same type (positions ignored)
    pub fn matches_verbatim(&self, other: &Entity) -> bool {
        self.text == other.text && self.entity_type == other.entity_type
    }
}

/// Relation types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    TransferTo,
    BelongsTo,
    PartOf,
    AssociatedWith,
    OccurredAt,
    HasAmount,
    Other(String),
}

impl RelationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TransferTo => "TRANSFER_TO",
            Self::BelongsTo => "BELONGS_TO",
            Self::PartOf => "PART_OF",
            Self::AssociatedWith => "ASSOCIATED_WITH",
            Self::OccurredAt => "OCCURRED_AT",
            Self::HasAmount => "HAS_AMOUNT",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TRANSFER_TO" => Self::TransferTo,
            "BELONGS_TO" => Self::BelongsTo,
            "PART_OF" => Self::PartOf,
            "ASSOCIATED_WITH" => Self::AssociatedWith,
            "OCCURRED_AT" => Self::OccurredAt,
            "HAS_AMOUNT" => Self::HasAmount,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<RelationType> for String {
    fn from(t: RelationType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed directed link between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub source: Entity,
    pub target: Entity,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Relation {
    pub fn new(relation_type: RelationType, source: Entity, target: Entity) -> Result<Self> {
        if source.text.trim().is_empty() || target.text.trim().is_empty() {
            return Err(Error::InvalidData(format!(
                "{} relation with empty endpoint text",
                relation_type
            )));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            relation_type,
            source,
            target,
            confidence: 1.0,
            metadata: Metadata::new(),
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Loosely shaped entity record accepted at the system boundary
///
/// Accepts both `type`/`label` and `start`/`start_pos` spellings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(rename = "type", alias = "label")]
    pub entity_type: String,
    #[serde(alias = "start_pos")]
    pub start: usize,
    #[serde(alias = "end_pos")]
    pub end: usize,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RawEntity {
    /// The single conversion point into the canonical `Entity`
    pub fn into_entity(self) -> Result<Entity> {
        let mut entity = Entity::new(
            self.text,
            EntityType::from(self.entity_type),
            self.start,
            self.end,
        )?;
        if let Some(id) = self.id {
            entity.id = id;
        }
        if let Some(confidence) = self.confidence {
            entity = entity.with_confidence(confidence);
        }
        entity.metadata.extend(flatten_metadata(self.metadata));
        Ok(entity)
    }
}

/// Loosely shaped relation record accepted at the system boundary
#[derive(Debug, Clone, Deserialize)]
pub struct RawRelation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", alias = "relation_type")]
    pub relation_type: String,
    pub source: RawEntity,
    pub target: RawEntity,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `amount`, `date`, `direction`, ... as read by graph ingestion
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RawRelation {
    pub fn into_relation(self) -> Result<Relation> {
        let mut relation = Relation::new(
            RelationType::from(self.relation_type),
            self.source.into_entity()?,
            self.target.into_entity()?,
        )?;
        if let Some(id) = self.id {
            relation.id = id;
        }
        if let Some(confidence) = self.confidence {
            relation = relation.with_confidence(confidence);
        }
        relation.metadata.extend(flatten_metadata(self.metadata));
        Ok(relation)
    }
}

/// String values pass through; anything else keeps its JSON text
fn flatten_metadata(
    raw: BTreeMap<String, serde_json::Value>,
) -> impl Iterator<Item = (String, String)> {
    raw.into_iter().map(|(key, value)| {
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        (key, value)
    })
}

/// Anomaly categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyType {
    #[serde(rename = "TIME_ANOMALY")]
    TimeAnomaly,
    #[serde(rename = "high_frequency_transfer")]
    HighFrequencyTransfer,
    #[serde(rename = "large_amount_transaction")]
    LargeAmountTransaction,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeAnomaly => "TIME_ANOMALY",
            Self::HighFrequencyTransfer => "high_frequency_transfer",
            Self::LargeAmountTransaction => "large_amount_transaction",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detector-specific facts backing an anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyEvidence {
    OffHours {
        timestamp: DateTime<Utc>,
        /// Local wall-clock time, `%Y-%m-%d %H:%M`
        local_time: String,
        location: String,
        timezone: String,
    },
    HighFrequency {
        account: String,
        transaction_count: usize,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
    },
    LargeAmount {
        transaction_id: String,
        account: String,
        amount: f64,
        timestamp: Option<DateTime<Utc>>,
    },
}

/// A flagged suspicious condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub description: String,
    /// Entity texts or graph node ids involved
    pub involved: Vec<String>,
    pub confidence: f64,
    pub context: String,
    pub evidence: AnomalyEvidence,
}

/// Why an item was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ParseError,
    UnknownTimezone,
    GraphIntegrity,
    InvalidRecord,
    InvariantViolation,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::UnknownTimezone => "unknown_timezone",
            Self::GraphIntegrity => "graph_integrity",
            Self::InvalidRecord => "invalid_record",
            Self::InvariantViolation => "invariant_violation",
        }
    }
}

/// Manifest entry for something logged and skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Processing unit (document id, CSV line, ...)
    pub unit: String,
    pub item: String,
    pub reason: SkipReason,
    pub detail: String,
}

impl SkippedItem {
    pub fn new(
        unit: impl Into<String>,
        item: impl Into<String>,
        reason: SkipReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            item: item.into(),
            reason,
            detail: detail.into(),
        }
    }
}
