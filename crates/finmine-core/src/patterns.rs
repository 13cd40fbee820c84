//! Adaptive extraction patterns
//!
//! The `PatternStore` owns a weighted library of context, regex and keyword
//! patterns. It adds entities the rule extractor missed (`enhance`) and adjusts
//! weights from user corrections (`learn`).
//!
//! ## Weights
//!
//! - New patterns start at 1.0
//! - Reinforcement multiplies by `reinforce_factor` (1.1), capped at `max_weight`
//! - Contradiction multiplies by `penalize_factor` (0.9)
//! - Patterns at or below `inert_threshold` (0.5) are kept but never matched
//!
//! All weight arithmetic happens here, under the store's write lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LearningConfig;
use crate::error::{Error, Result};
use crate::models::{Entity, EntityType};
use crate::text::CharMap;

/// Placeholder marking the entity position inside a context pattern
pub const ENTITY_PLACEHOLDER: &str = "{entity}";

/// Longest span (in chars) a context pattern may capture
const MAX_CONTEXT_CAPTURE: usize = 64;

/// Weight above which a pattern counts as "high weight" in statistics
const HIGH_WEIGHT: f64 = 1.5;

/// Kind of pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Context,
    Regex,
    Keyword,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Regex => "regex",
            Self::Keyword => "keyword",
        }
    }
}

impl std::str::FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "context" => Ok(Self::Context),
            "regex" => Ok(Self::Regex),
            "keyword" => Ok(Self::Keyword),
            _ => Err(format!("Unknown pattern kind: {}", s)),
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A learned extraction pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub pattern: String,
    pub entity_type: EntityType,
    pub weight: f64,
    #[serde(default)]
    pub matches: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub contradictions: u64,
}

impl Pattern {
    pub fn new(kind: PatternKind, pattern: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            entity_type,
            weight: 1.0,
            matches: 0,
            success_rate: 0.0,
            confirmations: 0,
            contradictions: 0,
        }
    }

    /// Identity of a pattern: kind, entity type and pattern text
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.entity_type, self.pattern)
    }

    fn same_identity(&self, kind: PatternKind, pattern: &str, entity_type: &EntityType) -> bool {
        self.kind == kind && self.pattern == pattern && &self.entity_type == entity_type
    }

    fn refresh_success_rate(&mut self) {
        let total = self.confirmations + self.contradictions;
        self.success_rate = if total == 0 {
            0.0
        } else {
            self.confirmations as f64 / total as f64
        };
    }
}

/// What a single `learn` call changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnOutcome {
    /// Spans present only in the corrected set
    pub additions: usize,
    /// Spans whose type was changed
    pub corrections: usize,
    /// Spans dropped by the user (counted, not learned from)
    pub removals: usize,
    pub patterns_created: usize,
    pub patterns_reinforced: usize,
    pub patterns_penalized: usize,
}

/// Summary of the pattern library
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternStatistics {
    pub total_patterns: usize,
    pub inert_patterns: usize,
    pub high_weight_patterns: usize,
    pub average_weight: f64,
    pub by_entity_type: BTreeMap<String, usize>,
}

/// Thread-safe weighted pattern library
pub struct PatternStore {
    config: LearningConfig,
    patterns: RwLock<Vec<Pattern>>,
    /// Compiled regexes by pattern text; `None` marks an invalid regex
    regex_cache: Mutex<HashMap<String, Option<Regex>>>,
}

impl std::fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternStore")
            .field("config", &self.config)
            .field("patterns", &self.len())
            .finish()
    }
}

impl PatternStore {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            patterns: RwLock::new(Vec::new()),
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a store from persisted patterns
    ///
    /// A negative weight is an invariant violation; weights above the cap are
    /// clamped.
    pub fn from_patterns(config: LearningConfig, patterns: Vec<Pattern>) -> Result<Self> {
        validate_weights(&patterns)?;
        let max = config.max_weight;
        let patterns = patterns
            .into_iter()
            .map(|mut p| {
                p.weight = p.weight.min(max);
                p.refresh_success_rate();
                p
            })
            .collect();
        Ok(Self {
            config,
            patterns: RwLock::new(patterns),
            regex_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Pattern>> {
        self.patterns.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Pattern>> {
        self.patterns.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add entities found by non-inert patterns
    ///
    /// Existing entities are returned first, unchanged. A match is added only
    /// if no existing or previously added entity has the same span, so running
    /// `enhance` on its own output adds nothing.
    pub fn enhance(&self, text: &str, existing: &[Entity]) -> Vec<Entity> {
        let chars = CharMap::new(text);
        let mut result = existing.to_vec();
        let mut taken: HashSet<(usize, usize)> = existing.iter().map(Entity::span).collect();
        let mut contributed: Vec<usize> = Vec::new();

        {
            let patterns = self.read();

            // Stronger patterns claim spans first
            let mut order: Vec<usize> = (0..patterns.len())
                .filter(|&i| patterns[i].weight > self.config.inert_threshold)
                .collect();
            order.sort_by(|&a, &b| patterns[b].weight.total_cmp(&patterns[a].weight));

            for idx in order {
                let pattern = &patterns[idx];
                let mut added = false;

                for (byte_start, byte_end) in self.find_matches(pattern, text) {
                    let (start, end) = chars.span(byte_start, byte_end);
                    if start == end || !taken.insert((start, end)) {
                        continue;
                    }

                    let entity = match Entity::new(
                        chars.slice(start, end),
                        pattern.entity_type.clone(),
                        start,
                        end,
                    ) {
                        Ok(e) => e,
                        Err(e) => {
                            warn!("Dropping pattern match at {}..{}: {}", start, end, e);
                            continue;
                        }
                    };

                    debug!(
                        "Pattern {} matched '{}' as {}",
                        pattern.kind, entity.text, pattern.entity_type
                    );
                    result.push(
                        entity
                            .with_confidence((pattern.weight / self.config.max_weight).min(1.0))
                            .with_metadata("pattern_kind", pattern.kind.as_str())
                            .with_metadata("source", "pattern"),
                    );
                    added = true;
                }

                if added {
                    contributed.push(idx);
                }
            }
        }

        if !contributed.is_empty() {
            // Patterns are append-only, so indices taken under the read lock stay valid
            let mut patterns = self.write();
            for idx in contributed {
                if let Some(p) = patterns.get_mut(idx) {
                    p.matches += 1;
                }
            }
        }

        result
    }

    /// Byte ranges of every match of a pattern in `text`
    fn find_matches(&self, pattern: &Pattern, text: &str) -> Vec<(usize, usize)> {
        match pattern.kind {
            PatternKind::Keyword => {
                if pattern.pattern.is_empty() {
                    return Vec::new();
                }
                text.match_indices(pattern.pattern.as_str())
                    .map(|(i, m)| (i, i + m.len()))
                    .collect()
            }
            PatternKind::Regex => match self.compiled(&pattern.pattern) {
                Some(re) => re
                    .find_iter(text)
                    .filter(|m| !m.is_empty())
                    .map(|m| (m.start(), m.end()))
                    .collect(),
                None => Vec::new(),
            },
            PatternKind::Context => context_matches(&pattern.pattern, text),
        }
    }

    /// Compile (once) and return a regex pattern; invalid regexes are logged once and skipped
    fn compiled(&self, source: &str) -> Option<Regex> {
        let mut cache = self.regex_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(source.to_string())
            .or_insert_with(|| match Regex::new(source) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Skipping invalid regex pattern '{}': {}", source, e);
                    None
                }
            })
            .clone()
    }

    /// Learn from a user correction of one text
    ///
    /// Entities are compared by span. Spans only in `corrected` are additions
    /// and synthesize context, regex and keyword patterns. Spans present in
    /// both with a different type are corrections: patterns of the original
    /// type are penalized, patterns of the corrected type reinforced.
    pub fn learn(&self, text: &str, original: &[Entity], corrected: &[Entity]) -> Result<LearnOutcome> {
        for entity in original.iter().chain(corrected) {
            entity.validate()?;
        }

        let chars = CharMap::new(text);
        let original_by_span: HashMap<(usize, usize), &Entity> =
            original.iter().map(|e| (e.span(), e)).collect();
        let corrected_spans: HashSet<(usize, usize)> = corrected.iter().map(Entity::span).collect();

        let mut outcome = LearnOutcome {
            removals: original_by_span
                .keys()
                .filter(|span| !corrected_spans.contains(span))
                .count(),
            ..Default::default()
        };

        let mut patterns = self.write();
        validate_weights(&patterns)?;

        for entity in corrected {
            match original_by_span.get(&entity.span()) {
                None => {
                    outcome.additions += 1;
                    for (kind, source) in self.synthesize(&chars, entity) {
                        if let Some(existing) = patterns
                            .iter_mut()
                            .find(|p| p.same_identity(kind, &source, &entity.entity_type))
                        {
                            existing.weight = self.clamp(existing.weight * self.config.reinforce_factor);
                            existing.confirmations += 1;
                            existing.refresh_success_rate();
                            outcome.patterns_reinforced += 1;
                        } else {
                            debug!("New {} pattern for {}: {}", kind, entity.entity_type, source);
                            patterns.push(Pattern::new(kind, source, entity.entity_type.clone()));
                            outcome.patterns_created += 1;
                        }
                    }
                }
                Some(before) if before.entity_type != entity.entity_type => {
                    outcome.corrections += 1;
                    for p in patterns.iter_mut() {
                        if p.entity_type == before.entity_type {
                            p.weight = self.clamp(p.weight * self.config.penalize_factor);
                            p.contradictions += 1;
                            p.refresh_success_rate();
                            outcome.patterns_penalized += 1;
                        } else if p.entity_type == entity.entity_type {
                            p.weight = self.clamp(p.weight * self.config.reinforce_factor);
                            p.confirmations += 1;
                            p.refresh_success_rate();
                            outcome.patterns_reinforced += 1;
                        }
                    }
                }
                Some(_) => {}
            }
        }

        info!(
            "Learned from feedback: {} additions, {} corrections, {} new patterns",
            outcome.additions, outcome.corrections, outcome.patterns_created
        );
        Ok(outcome)
    }

    /// Candidate patterns for an added entity
    fn synthesize(&self, chars: &CharMap<'_>, entity: &Entity) -> Vec<(PatternKind, String)> {
        if entity.text.is_empty() {
            return Vec::new();
        }

        let n = self.config.context_chars;
        let before = chars.slice(entity.start.saturating_sub(n), entity.start);
        let after = chars.slice(entity.end, entity.end.saturating_add(n));

        let mut out = Vec::with_capacity(3);
        if !before.is_empty() || !after.is_empty() {
            out.push((
                PatternKind::Context,
                format!("{}{}{}", before, ENTITY_PLACEHOLDER, after),
            ));
        }
        out.push((PatternKind::Regex, regex_for(entity)));
        out.push((PatternKind::Keyword, entity.text.clone()));
        out
    }

    fn clamp(&self, weight: f64) -> f64 {
        weight.clamp(0.0, self.config.max_weight)
    }

    /// Full pattern history, optionally filtered by entity type
    pub fn patterns(&self, entity_type: Option<&EntityType>) -> Vec<Pattern> {
        self.read()
            .iter()
            .filter(|p| entity_type.map_or(true, |t| &p.entity_type == t))
            .cloned()
            .collect()
    }

    /// Patterns above the promotion threshold, strongest first
    pub fn promoted(&self, entity_type: Option<&EntityType>) -> Vec<Pattern> {
        let mut promoted: Vec<Pattern> = self
            .patterns(entity_type)
            .into_iter()
            .filter(|p| p.weight > self.config.promote_threshold)
            .collect();
        promoted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        promoted
    }

    /// Current weight of every pattern, keyed by `Pattern::key`
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.read().iter().map(|p| (p.key(), p.weight)).collect()
    }

    /// Overwrite weights from a persisted weight map
    ///
    /// Keys that match no pattern are ignored.
    pub fn apply_weights(&self, weights: &BTreeMap<String, f64>) -> Result<()> {
        if let Some((key, w)) = weights.iter().find(|(_, w)| **w < 0.0) {
            return Err(Error::InvariantViolation(format!(
                "negative weight {} for pattern {}",
                w, key
            )));
        }
        let mut patterns = self.write();
        for p in patterns.iter_mut() {
            if let Some(w) = weights.get(&p.key()) {
                p.weight = self.clamp(*w);
            }
        }
        Ok(())
    }

    pub fn statistics(&self) -> PatternStatistics {
        let patterns = self.read();
        let mut stats = PatternStatistics {
            total_patterns: patterns.len(),
            ..Default::default()
        };
        if patterns.is_empty() {
            return stats;
        }

        let mut total_weight = 0.0;
        for p in patterns.iter() {
            total_weight += p.weight;
            if p.weight <= self.config.inert_threshold {
                stats.inert_patterns += 1;
            }
            if p.weight > HIGH_WEIGHT {
                stats.high_weight_patterns += 1;
            }
            *stats
                .by_entity_type
                .entry(p.entity_type.to_string())
                .or_insert(0) += 1;
        }
        stats.average_weight = total_weight / patterns.len() as f64;
        stats
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(LearningConfig::default())
    }
}

/// Reject any pattern with a negative weight
pub fn validate_weights(patterns: &[Pattern]) -> Result<()> {
    match patterns.iter().find(|p| p.weight < 0.0 || p.weight.is_nan()) {
        Some(p) => Err(Error::InvariantViolation(format!(
            "pattern {} has invalid weight {}",
            p.key(),
            p.weight
        ))),
        None => Ok(()),
    }
}

/// Regex synthesized for an added entity
fn regex_for(entity: &Entity) -> String {
    match entity.entity_type {
        EntityType::Account => r"\d{16,19}".to_string(),
        EntityType::Money => r"\d+(\.\d{2})?元".to_string(),
        EntityType::Percent => r"\d+(\.\d+)?%".to_string(),
        _ => regex::escape(&entity.text),
    }
}

/// Byte ranges captured between the literal prefix and suffix of a context pattern
fn context_matches(pattern: &str, text: &str) -> Vec<(usize, usize)> {
    let Some((prefix, suffix)) = pattern.split_once(ENTITY_PLACEHOLDER) else {
        return Vec::new();
    };
    if prefix.is_empty() && suffix.is_empty() {
        return Vec::new();
    }

    let starts: Vec<usize> = if prefix.is_empty() {
        vec![0]
    } else {
        text.match_indices(prefix).map(|(i, _)| i + prefix.len()).collect()
    };

    let mut out = Vec::new();
    for start in starts {
        let end = if suffix.is_empty() {
            text.len()
        } else {
            match text[start..].find(suffix) {
                Some(offset) => start + offset,
                None => continue,
            }
        };
        let captured = &text[start..end];
        if captured.is_empty()
            || captured.chars().count() > MAX_CONTEXT_CAPTURE
            || captured.contains('\n')
        {
            continue;
        }
        out.push((start, end));
    }
    out
}

/// Share of corrected entities the original output already had
///
/// Counts original entities that appear verbatim (same text and type) in
/// `corrected`, divided by the size of `corrected`, capped at 1.0.
pub fn accuracy(original: &[Entity], corrected: &[Entity]) -> f64 {
    match (original.is_empty(), corrected.is_empty()) {
        (true, true) => return 1.0,
        (false, true) => return 0.0,
        _ => {}
    }
    let hits = original
        .iter()
        .filter(|o| corrected.iter().any(|c| c.matches_verbatim(o)))
        .count();
    (hits as f64 / corrected.len() as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(text: &str, haystack: &str, entity_type: EntityType) -> Entity {
        let map = CharMap::new(haystack);
        let byte = haystack.find(text).unwrap();
        let (start, end) = map.span(byte, byte + text.len());
        Entity::new(text, entity_type, start, end).unwrap()
    }

    const TEXT: &str = "客户于2024年3月5日向账户6222021234567890123转账5000.00元";

    #[test]
    fn test_learn_addition_creates_three_patterns() {
        let store = PatternStore::default();
        let account = entity("6222021234567890123", TEXT, EntityType::Account);

        let outcome = store.learn(TEXT, &[], &[account]).unwrap();

        assert_eq!(outcome.additions, 1);
        assert_eq!(outcome.patterns_created, 3);
        let patterns = store.patterns(Some(&EntityType::Account));
        assert_eq!(patterns.len(), 3);
        assert!(patterns.iter().all(|p| p.weight == 1.0));
        assert!(patterns
            .iter()
            .any(|p| p.kind == PatternKind::Regex && p.pattern == r"\d{16,19}"));
        assert!(patterns
            .iter()
            .any(|p| p.kind == PatternKind::Context && p.pattern.contains(ENTITY_PLACEHOLDER)));
    }

    #[test]
    fn test_repeated_addition_reinforces_instead_of_duplicating() {
        let store = PatternStore::default();
        let account = entity("6222021234567890123", TEXT, EntityType::Account);

        store.learn(TEXT, &[], &[account.clone()]).unwrap();
        let outcome = store.learn(TEXT, &[], &[account]).unwrap();

        assert_eq!(outcome.patterns_created, 0);
        assert_eq!(outcome.patterns_reinforced, 3);
        let patterns = store.patterns(None);
        assert_eq!(patterns.len(), 3);
        assert!(patterns.iter().all(|p| (p.weight - 1.1).abs() < 1e-9));
    }

    #[test]
    fn test_correction_penalizes_and_reinforces() {
        let store = PatternStore::default();
        let money = entity("5000.00元", TEXT, EntityType::Money);
        let account = entity("6222021234567890123", TEXT, EntityType::Account);
        store.learn(TEXT, &[], &[money.clone(), account.clone()]).unwrap();

        // The user says the account span is really an ID
        let mut as_id = account.clone();
        as_id.entity_type = EntityType::Id;
        store.learn(TEXT, &[as_id.clone()], &[account]).unwrap();

        for p in store.patterns(Some(&EntityType::Account)) {
            assert!((p.weight - 1.1).abs() < 1e-9);
            assert_eq!(p.confirmations, 1);
            assert_eq!(p.success_rate, 1.0);
        }
        for p in store.patterns(Some(&EntityType::Money)) {
            assert_eq!(p.weight, 1.0);
        }
    }

    #[test]
    fn test_weights_stay_within_bounds() {
        let store = PatternStore::default();
        let account = entity("6222021234567890123", TEXT, EntityType::Account);
        for _ in 0..50 {
            store.learn(TEXT, &[], &[account.clone()]).unwrap();
        }
        assert!(store.patterns(None).iter().all(|p| p.weight <= 2.0));

        let mut wrong = account.clone();
        wrong.entity_type = EntityType::Id;
        for _ in 0..200 {
            store.learn(TEXT, &[account.clone()], &[wrong.clone()]).unwrap();
        }
        let patterns = store.patterns(Some(&EntityType::Account));
        assert!(patterns.iter().all(|p| p.weight >= 0.0 && p.weight <= 0.5));
    }

    #[test]
    fn test_enhance_adds_missing_entity_once() {
        let store = PatternStore::default();
        let account = entity("6222021234567890123", TEXT, EntityType::Account);
        store.learn(TEXT, &[], &[account]).unwrap();

        let other = "请核对账户6222029876543210987的流水";
        let enhanced = store.enhance(other, &[]);
        assert_eq!(enhanced.len(), 1);
        assert_eq!(enhanced[0].text, "6222029876543210987");
        assert_eq!(enhanced[0].entity_type, EntityType::Account);
        assert_eq!(enhanced[0].confidence, 0.5);
        assert_eq!(enhanced[0].metadata.get("source").map(String::as_str), Some("pattern"));

        // Idempotent on its own output
        let again = store.enhance(other, &enhanced);
        assert_eq!(again.len(), enhanced.len());
    }

    #[test]
    fn test_enhance_respects_existing_spans() {
        let store = PatternStore::default();
        let account = entity("6222021234567890123", TEXT, EntityType::Account);
        store.learn(TEXT, &[], &[account.clone()]).unwrap();

        let enhanced = store.enhance(TEXT, &[account]);
        assert_eq!(enhanced.len(), 1);
    }

    #[test]
    fn test_enhance_ignores_inert_patterns() {
        let store = PatternStore::from_patterns(
            LearningConfig::default(),
            vec![Pattern {
                weight: 0.5,
                ..Pattern::new(PatternKind::Keyword, "A001", EntityType::Account)
            }],
        )
        .unwrap();
        assert!(store.enhance("account A001", &[]).is_empty());
    }

    #[test]
    fn test_enhance_counts_matches() {
        let store = PatternStore::from_patterns(
            LearningConfig::default(),
            vec![Pattern::new(PatternKind::Keyword, "A001", EntityType::Account)],
        )
        .unwrap();
        store.enhance("A001 paid A001", &[]);
        assert_eq!(store.patterns(None)[0].matches, 1);
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let store = PatternStore::from_patterns(
            LearningConfig::default(),
            vec![
                Pattern::new(PatternKind::Regex, "(unclosed", EntityType::Term),
                Pattern::new(PatternKind::Keyword, "LPR", EntityType::Term),
            ],
        )
        .unwrap();
        let enhanced = store.enhance("LPR rate", &[]);
        assert_eq!(enhanced.len(), 1);
        assert_eq!(enhanced[0].text, "LPR");
    }

    #[test]
    fn test_context_pattern_matches_between_literals() {
        let spans = context_matches("向账户{entity}转账", "他向账户A-77转账了");
        assert_eq!(spans.len(), 1);
        let (s, e) = spans[0];
        assert_eq!(&"他向账户A-77转账了"[s..e], "A-77");
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut p = Pattern::new(PatternKind::Keyword, "x", EntityType::Term);
        p.weight = -0.1;
        let err = PatternStore::from_patterns(LearningConfig::default(), vec![p]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_promoted_filters_by_weight() {
        let mut strong = Pattern::new(PatternKind::Keyword, "LPR", EntityType::Term);
        strong.weight = 1.3;
        let weak = Pattern::new(PatternKind::Keyword, "SHIBOR", EntityType::Term);
        let store = PatternStore::from_patterns(LearningConfig::default(), vec![strong, weak]).unwrap();

        let promoted = store.promoted(None);
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].pattern, "LPR");
        assert_eq!(store.patterns(None).len(), 2);
    }

    #[test]
    fn test_accuracy() {
        let a = Entity::new("A001", EntityType::Account, 0, 4).unwrap();
        let b = Entity::new("5000元", EntityType::Money, 5, 10).unwrap();

        assert_eq!(accuracy(&[], &[]), 1.0);
        assert_eq!(accuracy(&[a.clone()], &[]), 0.0);
        // Extra predictions beyond the corrected list cap at 1.0
        assert_eq!(accuracy(&[a.clone(), b.clone()], &[a.clone()]), 1.0);
        assert_eq!(accuracy(&[a.clone()], &[a.clone(), b.clone()]), 0.5);
        assert_eq!(accuracy(&[a.clone(), b.clone()], &[a, b]), 1.0);
    }

    #[test]
    fn test_statistics() {
        let mut high = Pattern::new(PatternKind::Keyword, "LPR", EntityType::Term);
        high.weight = 1.8;
        let mut inert = Pattern::new(PatternKind::Keyword, "x", EntityType::Other("X".into()));
        inert.weight = 0.2;
        let store = PatternStore::from_patterns(LearningConfig::default(), vec![high, inert]).unwrap();

        let stats = store.statistics();
        assert_eq!(stats.total_patterns, 2);
        assert_eq!(stats.inert_patterns, 1);
        assert_eq!(stats.high_weight_patterns, 1);
        assert!((stats.average_weight - 1.0).abs() < 1e-9);
        assert_eq!(stats.by_entity_type.get("TERM"), Some(&1));
    }

    #[test]
    fn test_apply_weights() {
        let store = PatternStore::from_patterns(
            LearningConfig::default(),
            vec![Pattern::new(PatternKind::Keyword, "LPR", EntityType::Term)],
        )
        .unwrap();
        let key = store.patterns(None)[0].key();

        store.apply_weights(&BTreeMap::from([(key.clone(), 5.0)])).unwrap();
        assert_eq!(store.weights()[&key], 2.0);

        assert!(store.apply_weights(&BTreeMap::from([(key, -1.0)])).is_err());
    }
}
