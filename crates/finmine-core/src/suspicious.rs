//! Suspicious transaction patterns over the transaction graph
//!
//! Both detectors are pure reads. Transactions that fail the integrity check
//! are excluded, and output follows node insertion order.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::SuspicionConfig;
use crate::graph::TransactionGraph;
use crate::models::{Anomaly, AnomalyEvidence, AnomalyType};

pub struct SuspiciousPatternDetector {
    config: SuspicionConfig,
}

impl SuspiciousPatternDetector {
    pub fn new(config: SuspicionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SuspicionConfig {
        &self.config
    }

    /// Accounts initiating a burst of transfers inside the time window
    ///
    /// For each real account, the timestamps of the transactions it initiated
    /// are sorted and scanned with a sliding window. The largest run of at
    /// least `min_transactions` whose span is strictly shorter than the window
    /// yields one anomaly.
    pub fn detect_high_frequency(&self, graph: &TransactionGraph) -> Vec<Anomaly> {
        let window = self.config.window();
        let mut anomalies = Vec::new();

        for account in graph.accounts().filter(|a| !a.properties.synthetic) {
            let mut times: Vec<DateTime<Utc>> = graph
                .initiated_by(&account.node_id)
                .iter()
                .filter_map(|tx| tx.properties.timestamp)
                .collect();
            if times.len() < self.config.min_transactions {
                continue;
            }
            times.sort();

            let Some((first, last, count)) = largest_burst(&times, window) else {
                continue;
            };
            if count < self.config.min_transactions {
                continue;
            }

            debug!("{} initiated {} transfers in {}", account.node_id, count, last - first);
            anomalies.push(Anomaly {
                anomaly_type: AnomalyType::HighFrequencyTransfer,
                description: format!(
                    "Account {} initiated {} transfers within {} minutes",
                    account.node_id,
                    count,
                    self.config.window_minutes
                ),
                involved: vec![account.node_id.clone()],
                confidence: self.config.high_frequency_confidence,
                context: format!("{} to {}", first.to_rfc3339(), last.to_rfc3339()),
                evidence: AnomalyEvidence::HighFrequency {
                    account: account.node_id.clone(),
                    transaction_count: count,
                    first,
                    last,
                },
            });
        }

        anomalies
    }

    /// Transactions whose amount is strictly above the threshold
    pub fn detect_large_amount(&self, graph: &TransactionGraph) -> Vec<Anomaly> {
        let threshold = self.config.large_amount_threshold;

        graph
            .transactions()
            .into_iter()
            .filter_map(|view| {
                let amount = view.transaction.properties.amount?;
                if amount <= threshold {
                    return None;
                }
                let tx = view.transaction;
                let account = &view.initiator.node_id;

                Some(Anomaly {
                    anomaly_type: AnomalyType::LargeAmountTransaction,
                    description: format!(
                        "Transaction {} of {:.2} from {} exceeds {:.2}",
                        tx.node_id, amount, account, threshold
                    ),
                    involved: vec![tx.node_id.clone(), account.clone()],
                    confidence: self.config.large_amount_confidence,
                    context: tx
                        .properties
                        .timestamp
                        .map(|ts| ts.to_rfc3339())
                        .unwrap_or_default(),
                    evidence: AnomalyEvidence::LargeAmount {
                        transaction_id: tx.node_id.clone(),
                        account: account.clone(),
                        amount,
                        timestamp: tx.properties.timestamp,
                    },
                })
            })
            .collect()
    }

    /// High-frequency anomalies followed by large-amount anomalies
    pub fn detect_all(&self, graph: &TransactionGraph) -> Vec<Anomaly> {
        let mut anomalies = self.detect_high_frequency(graph);
        anomalies.extend(self.detect_large_amount(graph));
        anomalies
    }
}

impl Default for SuspiciousPatternDetector {
    fn default() -> Self {
        Self::new(SuspicionConfig::default())
    }
}

/// Largest run of sorted timestamps with `last - first < window`
///
/// Returns `(first, last, count)`; the earliest run wins ties.
fn largest_burst(
    times: &[DateTime<Utc>],
    window: chrono::Duration,
) -> Option<(DateTime<Utc>, DateTime<Utc>, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut lo = 0;

    for hi in 0..times.len() {
        while times[hi] - times[lo] >= window {
            lo += 1;
        }
        let len = hi - lo + 1;
        if best.map_or(true, |(b_lo, b_hi)| len > b_hi - b_lo + 1) {
            best = Some((lo, hi));
        }
    }

    best.map(|(lo, hi)| (times[lo], times[hi], hi - lo + 1))
}
