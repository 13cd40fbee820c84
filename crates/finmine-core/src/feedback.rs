//! Feedback loop
//!
//! Corrections are handed to the `PatternStore` and recorded in an append-only
//! history. Reports average the trailing `history_window` records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::Entity;
use crate::patterns::{accuracy, LearnOutcome, PatternStore};

/// One submitted correction and the metrics computed for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub original: Vec<Entity>,
    pub corrected: Vec<Entity>,
    /// Seconds spent producing `original`
    pub processing_time: f64,
    pub accuracy: f64,
    #[serde(default)]
    pub precision: f64,
    #[serde(default)]
    pub recall: f64,
    #[serde(default)]
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub average_accuracy: f64,
    /// Least-squares slope of accuracy over the window (per submission)
    pub accuracy_trend: f64,
    pub average_processing_time: f64,
    pub average_precision: f64,
    pub average_recall: f64,
    pub average_f1: f64,
    pub total_patterns_learned: usize,
    pub feedback_count: usize,
}

/// Precision, recall and F1 of `original` against `corrected`
///
/// An entity counts as correct when `corrected` holds one with the same
/// span, type and text. Empty denominators give 0.
pub fn precision_recall_f1(original: &[Entity], corrected: &[Entity]) -> (f64, f64, f64) {
    let tp = original
        .iter()
        .filter(|o| {
            corrected
                .iter()
                .any(|c| c.span() == o.span() && c.matches_verbatim(o))
        })
        .count() as f64;

    let ratio = |n: usize| if n == 0 { 0.0 } else { tp / n as f64 };
    let precision = ratio(original.len());
    let recall = ratio(corrected.len());
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Ordinary least-squares slope of `ys` against their index
pub fn ols_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub struct FeedbackLoop {
    store: Arc<PatternStore>,
    history: Vec<FeedbackRecord>,
    window: usize,
}

impl FeedbackLoop {
    pub fn new(store: Arc<PatternStore>) -> Self {
        let window = store.config().history_window;
        Self {
            store,
            history: Vec::new(),
            window,
        }
    }

    /// Resume with a persisted history
    pub fn with_history(store: Arc<PatternStore>, history: Vec<FeedbackRecord>) -> Self {
        Self {
            history,
            ..Self::new(store)
        }
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    pub fn history(&self) -> &[FeedbackRecord] {
        &self.history
    }

    /// Learn from a correction and append it to the history
    pub fn update_from_feedback(
        &mut self,
        text: &str,
        original: &[Entity],
        corrected: &[Entity],
        processing_time: f64,
    ) -> Result<LearnOutcome> {
        if !processing_time.is_finite() || processing_time < 0.0 {
            return Err(Error::InvalidData(format!(
                "processing time must be a non-negative number of seconds (got {})",
                processing_time
            )));
        }

        let outcome = self.store.learn(text, original, corrected)?;

        let (precision, recall, f1) = precision_recall_f1(original, corrected);
        let record = FeedbackRecord {
            timestamp: Utc::now(),
            text: text.to_string(),
            original: original.to_vec(),
            corrected: corrected.to_vec(),
            processing_time,
            accuracy: accuracy(original, corrected),
            precision,
            recall,
            f1,
        };
        info!(
            "Feedback #{}: accuracy {:.3}, f1 {:.3}",
            self.history.len() + 1,
            record.accuracy,
            record.f1
        );
        self.history.push(record);

        Ok(outcome)
    }

    /// Averages over the trailing window, or `None` before any feedback
    pub fn get_performance_report(&self) -> Option<PerformanceReport> {
        if self.history.is_empty() {
            return None;
        }

        let start = self.history.len().saturating_sub(self.window);
        let recent = &self.history[start..];
        let accuracies: Vec<f64> = recent.iter().map(|r| r.accuracy).collect();
        let accuracy_trend = ols_slope(&accuracies);

        if accuracy_trend < 0.0 {
            warn!(
                "Accuracy is trending down ({:.4} per submission over {} records)",
                accuracy_trend,
                recent.len()
            );
        }

        Some(PerformanceReport {
            average_accuracy: mean(accuracies.iter().copied()),
            accuracy_trend,
            average_processing_time: mean(recent.iter().map(|r| r.processing_time)),
            average_precision: mean(recent.iter().map(|r| r.precision)),
            average_recall: mean(recent.iter().map(|r| r.recall)),
            average_f1: mean(recent.iter().map(|r| r.f1)),
            total_patterns_learned: self.store.len(),
            feedback_count: self.history.len(),
        })
    }
}
