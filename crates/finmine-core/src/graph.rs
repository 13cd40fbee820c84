//! Transaction graph
//!
//! A directed multigraph of accounts, transactions and locations. Every
//! transfer becomes a transaction node wired as
//!
//! ```text
//! source --initiated--> tx_... --sent_to--> target
//!                          \--located_in--> location:<name>
//! ```
//!
//! Node ids are unique across kinds: accounts use their own id, transactions
//! `tx_{source}_{target}_{micros}_{seq}`, locations `location:{name}`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::extract::parse_money;
use crate::models::{Entity, EntityType, Metadata, Relation, RelationType, SkipReason, SkippedItem};
use crate::relations::DIRECTION_IN;
use crate::temporal::parse_time;

/// Counterparty used when a transfer names only one account
pub const EXTERNAL_ACCOUNT: &str = "external";

const LOCATION_PREFIX: &str = "location:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Account,
    Transaction,
    Location,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Transaction => "transaction",
            Self::Location => "location",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Initiated,
    SentTo,
    LocatedIn,
}

/// Typed node properties plus an open extension map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Placeholder node not backed by a real account
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extra: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: String,
    pub node_type: NodeType,
    pub properties: NodeProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: EdgeType,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub properties: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
struct EdgeData {
    relation_type: EdgeType,
    properties: Metadata,
}

/// One tabular transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub account_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
}

/// A transaction node that is not wired as initiated-by-one, sent-to-some
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub transaction_id: String,
    pub initiated: usize,
    pub sent_to: usize,
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} has {} initiated / {} sent_to edges",
            self.transaction_id, self.initiated, self.sent_to
        )
    }
}

/// Serializable view of the whole graph, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Transactions recorded from one unit's relations
#[derive(Debug, Clone, Default)]
pub struct RelationIngest {
    pub transactions: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

/// An eligible transaction and the account that initiated it
#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a> {
    pub transaction: &'a GraphNode,
    pub initiator: &'a GraphNode,
}

#[derive(Debug, Default)]
pub struct TransactionGraph {
    graph: DiGraph<GraphNode, EdgeData>,
    index: HashMap<String, NodeIndex>,
    seq: u64,
}

impl TransactionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.index.get(node_id).map(|&idx| &self.graph[idx])
    }

    /// Insert an account or refresh its `last_activity`
    ///
    /// Activity only moves forward. An id already used by another node kind
    /// is a `GraphIntegrity` error.
    pub fn upsert_account(&mut self, account_id: &str, last_activity: Option<DateTime<Utc>>) -> Result<NodeIndex> {
        if account_id.trim().is_empty() {
            return Err(Error::InvalidData("empty account id".into()));
        }

        let idx = self.upsert(account_id, NodeType::Account)?;
        let props = &mut self.graph[idx].properties;
        if let Some(ts) = last_activity {
            if props.last_activity.map_or(true, |prev| ts > prev) {
                props.last_activity = Some(ts);
            }
        }
        if account_id == EXTERNAL_ACCOUNT {
            props.synthetic = true;
        }
        Ok(idx)
    }

    pub fn upsert_location(&mut self, name: &str) -> Result<NodeIndex> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("empty location name".into()));
        }
        self.upsert(&format!("{}{}", LOCATION_PREFIX, name), NodeType::Location)
    }

    fn upsert(&mut self, node_id: &str, node_type: NodeType) -> Result<NodeIndex> {
        if let Some(&idx) = self.index.get(node_id) {
            let existing = self.graph[idx].node_type;
            if existing != node_type {
                return Err(Error::GraphIntegrity(format!(
                    "node {} is a {}, not a {}",
                    node_id, existing, node_type
                )));
            }
            return Ok(idx);
        }

        let idx = self.graph.add_node(GraphNode {
            node_id: node_id.to_string(),
            node_type,
            properties: NodeProperties::default(),
        });
        self.index.insert(node_id.to_string(), idx);
        Ok(idx)
    }

    /// Add a bare transaction node (wire it with `link`)
    pub fn add_transaction(&mut self, tx_id: &str, properties: NodeProperties) -> Result<NodeIndex> {
        if self.index.contains_key(tx_id) {
            return Err(Error::GraphIntegrity(format!("duplicate node id {}", tx_id)));
        }
        let idx = self.graph.add_node(GraphNode {
            node_id: tx_id.to_string(),
            node_type: NodeType::Transaction,
            properties,
        });
        self.index.insert(tx_id.to_string(), idx);
        Ok(idx)
    }

    /// Add an edge between two existing nodes (parallel edges allowed)
    pub fn link(&mut self, source_id: &str, target_id: &str, relation_type: EdgeType) -> Result<()> {
        let lookup = |id: &str| {
            self.index
                .get(id)
                .copied()
                .ok_or_else(|| Error::GraphIntegrity(format!("unknown node {}", id)))
        };
        let (a, b) = (lookup(source_id)?, lookup(target_id)?);
        self.graph.add_edge(
            a,
            b,
            EdgeData {
                relation_type,
                properties: Metadata::new(),
            },
        );
        Ok(())
    }

    /// Record a transfer between two accounts, returning the transaction id
    pub fn record_transfer(
        &mut self,
        source: &str,
        target: &str,
        amount: Option<f64>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<String> {
        self.upsert_account(source, timestamp)?;
        self.upsert_account(target, timestamp)?;

        self.seq += 1;
        let micros = timestamp.unwrap_or_else(Utc::now).timestamp_micros();
        let tx_id = format!("tx_{}_{}_{}_{}", source, target, micros, self.seq);

        self.add_transaction(
            &tx_id,
            NodeProperties {
                timestamp,
                amount,
                ..Default::default()
            },
        )?;
        self.link(source, &tx_id, EdgeType::Initiated)?;
        self.link(&tx_id, target, EdgeType::SentTo)?;

        debug!("Recorded {} ({:?})", tx_id, amount);
        Ok(tx_id)
    }

    /// Add one tabular row; rows without a counterparty go to `external`
    pub fn ingest_row(&mut self, row: &TransactionRow) -> Result<String> {
        let target = row
            .counterparty
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(EXTERNAL_ACCOUNT);

        let tx_id = self.record_transfer(&row.account_id, target, Some(row.amount), Some(row.timestamp))?;

        if let Some(&idx) = self.index.get(&tx_id) {
            let props = &mut self.graph[idx].properties;
            props.transaction_type = row.transaction_type.clone();
            props.device_id = row.device_id.clone();
        }

        if let Some(location) = row.location.as_deref().filter(|l| !l.trim().is_empty()) {
            let loc_idx = self.upsert_location(location)?;
            let loc_id = self.graph[loc_idx].node_id.clone();
            self.link(&tx_id, &loc_id, EdgeType::LocatedIn)?;
        }

        Ok(tx_id)
    }

    /// Register a unit's ACCOUNT entities and record its transfer relations
    ///
    /// Every relation endpoint must be one of `entities`; a dangling endpoint
    /// is an `InvariantViolation` for the unit. Unparseable amounts or dates
    /// are recorded as skipped items and the transfer is kept without them.
    pub fn ingest_relations(
        &mut self,
        unit: &str,
        relations: &[Relation],
        entities: &[Entity],
    ) -> Result<RelationIngest> {
        for relation in relations {
            for endpoint in [&relation.source, &relation.target] {
                if !entities.iter().any(|e| same_entity(e, endpoint)) {
                    return Err(Error::InvariantViolation(format!(
                        "{} relation {} references entity '{}' not present in {}",
                        relation.relation_type, relation.id, endpoint.text, unit
                    )));
                }
            }
        }

        let mut ingest = RelationIngest::default();
        for entity in entities.iter().filter(|e| e.entity_type == EntityType::Account) {
            if let Err(e) = self.upsert_account(entity.text.trim(), None) {
                warn!("Skipping account '{}' in {}: {}", entity.text, unit, e);
                ingest.skipped.push(SkippedItem::new(
                    unit,
                    entity.text.clone(),
                    skip_reason(&e),
                    e.to_string(),
                ));
            }
        }

        for relation in relations {
            let (source, target, amount_text) = match relation.relation_type {
                RelationType::TransferTo => (
                    relation.source.text.trim(),
                    relation.target.text.trim(),
                    relation.metadata.get("amount").map(String::as_str),
                ),
                RelationType::HasAmount if relation.source.entity_type == EntityType::Account => {
                    let account = relation.source.text.trim();
                    let amount = Some(relation.target.text.as_str());
                    match relation.metadata.get("direction").map(String::as_str) {
                        Some(DIRECTION_IN) => (EXTERNAL_ACCOUNT, account, amount),
                        _ => (account, EXTERNAL_ACCOUNT, amount),
                    }
                }
                _ => continue,
            };

            let amount = match amount_text {
                Some(text) => {
                    let parsed = parse_money(text);
                    if parsed.is_none() {
                        warn!("Unparseable amount '{}' in {}", text, unit);
                        ingest.skipped.push(SkippedItem::new(
                            unit,
                            text,
                            SkipReason::ParseError,
                            "unparseable amount",
                        ));
                    }
                    parsed
                }
                None => None,
            };

            let timestamp = match relation.metadata.get("date") {
                Some(text) => match parse_time(text) {
                    Ok(ts) => Some(ts),
                    Err(e) => {
                        warn!("Transfer date '{}' in {}: {}", text, unit, e);
                        ingest.skipped.push(SkippedItem::new(
                            unit,
                            text,
                            SkipReason::ParseError,
                            e.to_string(),
                        ));
                        None
                    }
                },
                None => None,
            };

            match self.record_transfer(source, target, amount, timestamp) {
                Ok(tx_id) => ingest.transactions.push(tx_id),
                Err(e) => {
                    warn!(
                        "Skipping {} relation {} in {}: {}",
                        relation.relation_type, relation.id, unit, e
                    );
                    ingest.skipped.push(SkippedItem::new(
                        unit,
                        relation.id.clone(),
                        skip_reason(&e),
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(ingest)
    }

    fn count_edges(&self, idx: NodeIndex, direction: Direction, relation_type: EdgeType) -> usize {
        self.graph
            .edges_directed(idx, direction)
            .filter(|e| e.weight().relation_type == relation_type)
            .count()
    }

    fn initiator(&self, tx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(tx, Direction::Incoming)
            .find(|e| e.weight().relation_type == EdgeType::Initiated)
            .map(|e| e.source())
    }

    fn is_eligible(&self, tx: NodeIndex) -> bool {
        self.count_edges(tx, Direction::Incoming, EdgeType::Initiated) == 1
            && self.count_edges(tx, Direction::Outgoing, EdgeType::SentTo) >= 1
    }

    /// Transactions not wired as exactly one `initiated` in and at least one `sent_to` out
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].node_type == NodeType::Transaction)
            .filter(|&idx| !self.is_eligible(idx))
            .map(|idx| IntegrityIssue {
                transaction_id: self.graph[idx].node_id.clone(),
                initiated: self.count_edges(idx, Direction::Incoming, EdgeType::Initiated),
                sent_to: self.count_edges(idx, Direction::Outgoing, EdgeType::SentTo),
            })
            .collect()
    }

    /// Account nodes in insertion order
    pub fn accounts(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph
            .node_indices()
            .map(move |idx| &self.graph[idx])
            .filter(|n| n.node_type == NodeType::Account)
    }

    /// Eligible transactions in insertion order
    pub fn transactions(&self) -> Vec<TransactionView<'_>> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].node_type == NodeType::Transaction && self.is_eligible(idx))
            .filter_map(|idx| {
                self.initiator(idx).map(|src| TransactionView {
                    transaction: &self.graph[idx],
                    initiator: &self.graph[src],
                })
            })
            .collect()
    }

    /// Eligible transactions initiated by one account, in insertion order
    pub fn initiated_by(&self, account_id: &str) -> Vec<&GraphNode> {
        let Some(&idx) = self.index.get(account_id) else {
            return Vec::new();
        };
        let mut txs: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| e.weight().relation_type == EdgeType::Initiated)
            .map(|e| e.target())
            .filter(|&tx| self.is_eligible(tx))
            .collect();
        // petgraph walks adjacency lists newest-first
        txs.sort();
        txs.dedup();
        txs.into_iter().map(|tx| &self.graph[tx]).collect()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self
                .graph
                .edge_references()
                .map(|e| GraphEdge {
                    source_id: self.graph[e.source()].node_id.clone(),
                    target_id: self.graph[e.target()].node_id.clone(),
                    relation_type: e.weight().relation_type,
                    properties: e.weight().properties.clone(),
                })
                .collect(),
        }
    }
}

/// Same entity by id, or by identical text, type and span
fn same_entity(a: &Entity, b: &Entity) -> bool {
    a.id == b.id || (a.span() == b.span() && a.matches_verbatim(b))
}

/// Graph rejections that drop one item rather than the whole unit
pub(crate) fn skip_reason(error: &Error) -> SkipReason {
    match error {
        Error::GraphIntegrity(_) => SkipReason::GraphIntegrity,
        _ => SkipReason::InvalidRecord,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, h, m, 0).unwrap()
    }

    fn row(account: &str, amount: f64, at: DateTime<Utc>) -> TransactionRow {
        TransactionRow {
            account_id: account.into(),
            amount,
            timestamp: at,
            transaction_type: None,
            location: None,
            device_id: None,
            counterparty: None,
        }
    }

    #[test]
    fn test_upsert_account_idempotent() {
        let mut graph = TransactionGraph::new();
        graph.upsert_account("A001", Some(ts(10, 0))).unwrap();
        graph.upsert_account("A001", Some(ts(9, 0))).unwrap();
        graph.upsert_account("A001", Some(ts(11, 0))).unwrap();

        assert_eq!(graph.node_count(), 1);
        let node = graph.node("A001").unwrap();
        assert_eq!(node.node_type, NodeType::Account);
        assert_eq!(node.properties.last_activity, Some(ts(11, 0)));
    }

    #[test]
    fn test_record_transfer_shape() {
        let mut graph = TransactionGraph::new();
        let tx = graph
            .record_transfer("A001", "B002", Some(500.0), Some(ts(10, 0)))
            .unwrap();

        assert!(tx.starts_with("tx_A001_B002_"));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.integrity_issues().is_empty());
        assert_eq!(graph.initiated_by("A001").len(), 1);
        assert!(graph.initiated_by("B002").is_empty());
    }

    #[test]
    fn test_transaction_ids_unique_for_same_instant() {
        let mut graph = TransactionGraph::new();
        let a = graph.record_transfer("A001", "B002", None, Some(ts(10, 0))).unwrap();
        let b = graph.record_transfer("A001", "B002", None, Some(ts(10, 0))).unwrap();
        assert_ne!(a, b);
        // Parallel edges between the same accounts are kept
        assert_eq!(graph.initiated_by("A001").len(), 2);
    }

    #[test]
    fn test_ingest_row_without_counterparty_uses_external() {
        let mut graph = TransactionGraph::new();
        let mut r = row("A001", 50.0, ts(10, 0));
        r.location = Some("Tokyo".into());
        r.device_id = Some("D-1".into());
        let tx = graph.ingest_row(&r).unwrap();

        let external = graph.node(EXTERNAL_ACCOUNT).unwrap();
        assert!(external.properties.synthetic);
        assert!(graph.node("location:Tokyo").is_some());
        assert_eq!(graph.node(&tx).unwrap().properties.device_id.as_deref(), Some("D-1"));
        assert!(graph.integrity_issues().is_empty());

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.edges.len(), 3);
        assert_eq!(snapshot.nodes[0].node_id, "A001");
    }

    #[test]
    fn test_integrity_issue_reported() {
        let mut graph = TransactionGraph::new();
        graph.upsert_account("A001", None).unwrap();
        graph.add_transaction("tx_orphan", NodeProperties::default()).unwrap();
        graph.link("A001", "tx_orphan", EdgeType::Initiated).unwrap();

        let issues = graph.integrity_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].transaction_id, "tx_orphan");
        assert_eq!(issues[0].sent_to, 0);
        assert!(graph.transactions().is_empty());
    }

    #[test]
    fn test_account_id_cannot_change_kind() {
        let mut graph = TransactionGraph::new();
        graph.add_transaction("T1", NodeProperties::default()).unwrap();
        assert!(matches!(
            graph.upsert_account("T1", None),
            Err(Error::GraphIntegrity(_))
        ));
    }

    #[test]
    fn test_dangling_relation_endpoint_is_fatal() {
        let a = Entity::new("A001", EntityType::Account, 0, 4).unwrap();
        let b = Entity::new("B002", EntityType::Account, 10, 14).unwrap();
        let relation = Relation::new(RelationType::TransferTo, a.clone(), b).unwrap();

        let mut graph = TransactionGraph::new();
        let err = graph.ingest_relations("doc", &[relation], &[a]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_ingest_relations_records_transfers() {
        let a = Entity::new("A001", EntityType::Account, 0, 4).unwrap();
        let b = Entity::new("B002", EntityType::Account, 10, 14).unwrap();
        let relation = Relation::new(RelationType::TransferTo, a.clone(), b.clone())
            .unwrap()
            .with_metadata("amount", "$1,500")
            .with_metadata("date", "not a date");

        let mut graph = TransactionGraph::new();
        let ingest = graph.ingest_relations("doc", &[relation], &[a, b]).unwrap();

        assert_eq!(ingest.transactions.len(), 1);
        assert_eq!(ingest.skipped.len(), 1);
        assert_eq!(ingest.skipped[0].reason, SkipReason::ParseError);
        let tx = graph.node(&ingest.transactions[0]).unwrap();
        assert_eq!(tx.properties.amount, Some(1500.0));
        assert_eq!(tx.properties.timestamp, None);
    }

    #[test]
    fn test_ingest_relations_skips_rejected_accounts() {
        let mut graph = TransactionGraph::new();
        graph.upsert_location("Tokyo").unwrap();

        let a = Entity::new("A001", EntityType::Account, 0, 4).unwrap();
        let b = Entity::new("B002", EntityType::Account, 10, 14).unwrap();
        let clash = Entity::new("location:Tokyo", EntityType::Account, 20, 34).unwrap();
        let blank = Entity::new(" ", EntityType::Account, 40, 41).unwrap();
        let to_clash = Relation::new(RelationType::TransferTo, a.clone(), clash.clone()).unwrap();
        let to_b = Relation::new(RelationType::TransferTo, a.clone(), b.clone()).unwrap();

        let ingest = graph
            .ingest_relations("doc", &[to_clash.clone(), to_b], &[a, b, clash, blank])
            .unwrap();

        assert_eq!(ingest.transactions.len(), 1);
        assert!(ingest.transactions[0].starts_with("tx_A001_B002_"));
        let reasons: Vec<SkipReason> = ingest.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::GraphIntegrity,
                SkipReason::InvalidRecord,
                SkipReason::GraphIntegrity
            ]
        );
        assert_eq!(ingest.skipped[2].item, to_clash.id);
        assert_eq!(graph.node("location:Tokyo").unwrap().node_type, NodeType::Location);
        assert!(graph.integrity_issues().is_empty());
    }
}
