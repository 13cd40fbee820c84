//! Rule-based entity extraction
//!
//! A regex and dictionary recognizer for the entity types the anomaly engine
//! depends on (DATE, TIME, MONEY, PERCENT, ACCOUNT, GEO) plus a few
//! best-effort ones (ORG, PERSON, EVENT, PRODUCT). Learned patterns from the
//! `PatternStore` are layered on top of this output.

use regex::Regex;
use tracing::debug;

use crate::config::TemporalConfig;
use crate::error::Result;
use crate::models::{Entity, EntityType};
use crate::text::CharMap;

/// Confidence assigned to rule matches
const RULE_CONFIDENCE: f64 = 0.8;

/// Confidence assigned to dictionary matches
const DICTIONARY_CONFIDENCE: f64 = 0.6;

/// Cities recognized as GEO even without a timezone mapping
const EXTRA_LOCATIONS: &[&str] = &["广州", "深圳", "杭州", "Paris", "Frankfurt", "Zurich"];

const EVENT_TERMS: &[&str] = &[
    "收购", "合并", "重组", "上市", "增发", "减持", "分红", "停牌", "复牌", "退市", "破产",
    "清算", "整改", "处罚",
];

const PRODUCT_TERMS: &[&str] = &[
    "理财产品", "信托计划", "资管计划", "股票", "债券", "期货", "期权", "存单", "保单",
];

/// One recognizer: a regex, the capture group holding the entity, and an
/// optional post-filter on the matched text
struct Rule {
    entity_type: EntityType,
    regex: Regex,
    group: usize,
    confidence: f64,
    accept: Option<fn(&str) -> bool>,
}

impl Rule {
    fn new(entity_type: EntityType, pattern: &str) -> Result<Self> {
        Ok(Self {
            entity_type,
            regex: Regex::new(pattern)?,
            group: 0,
            confidence: RULE_CONFIDENCE,
            accept: None,
        })
    }

    fn group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    fn accept(mut self, accept: fn(&str) -> bool) -> Self {
        self.accept = Some(accept);
        self
    }
}

/// Baseline extractor used before pattern enhancement
pub struct RuleExtractor {
    rules: Vec<Rule>,
}

impl RuleExtractor {
    /// Build an extractor whose GEO gazetteer is `locations`
    pub fn new<I, S>(locations: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Rule order breaks ties between equal-length overlapping matches
        let mut rules = vec![
            Rule::new(
                EntityType::Date,
                r"\d{4}-\d{1,2}-\d{1,2}(?:[T ]\d{1,2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:?\d{2})?)?",
            )?,
            Rule::new(EntityType::Date, r"\d{4}/\d{1,2}/\d{1,2}(?: \d{1,2}:\d{2}(?::\d{2})?)?")?,
            Rule::new(EntityType::Date, r"\d{4}\.\d{1,2}\.\d{1,2}")?,
            Rule::new(EntityType::Date, r"\d{4}\s*年\s*\d{1,2}\s*月(?:\s*\d{1,2}\s*[日号])?")?,
            Rule::new(EntityType::Date, r"\d{1,2}\s*月\s*\d{1,2}\s*[日号]")?,
            Rule::new(
                EntityType::Date,
                r"(?i)\d{1,2}-(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)-\d{4}(?: \d{1,2}:\d{2})?",
            )?,
            Rule::new(EntityType::Date, r"\d{1,2}/\d{1,2}/\d{4}")?,
            Rule::new(EntityType::Date, r"\d{4}/\d{1,2}")?,
            Rule::new(EntityType::Time, r"\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm])?")?,
            Rule::new(EntityType::Account, r"\d{16,}")?.accept(|s| s.len() <= 19),
            Rule::new(
                EntityType::Account,
                r"(?i)(?:account|acct\.?|账户|账号|卡号)\s*(?:no\.?|number|#)?\s*[:：]?\s*([A-Z]{1,3}\d{3,})",
            )?
            .group(1),
            Rule::new(
                EntityType::Money,
                r"(?:(?:人民币|美元|欧元|日元|港币)\s*)?\d[\d,]*(?:\.\d+)?\s*(?:万|亿|千|百)?(?:元|美元|欧元|英镑|日元)",
            )?,
            Rule::new(EntityType::Money, r"[$€¥￥£]\s?\d[\d,]*(?:\.\d+)?[KMB]?")?,
            Rule::new(
                EntityType::Money,
                r"(?:USD|CNY|RMB|EUR|GBP|JPY|HKD)\s?\d[\d,]*(?:\.\d+)?",
            )?,
            Rule::new(EntityType::Percent, r"\d+(?:\.\d+)?%")?,
        ];

        if let Some(geo) = gazetteer_regex(locations)? {
            rules.push(geo);
        }

        rules.push(
            Rule::new(
                EntityType::Org,
                r"[一-龥]{2,}(?:公司|银行|集团|企业|基金)|[A-Z][A-Za-z&]+(?:\s+[A-Z][A-Za-z&]+)*\s+(?:Inc\.|Corp\.|Ltd\.|LLC|Company|Bank|Group)",
            )?
            .accept(|s| s.chars().count() >= 4),
        );
        rules.push(
            Rule::new(
                EntityType::Person,
                r"[一-龥]{2,4}(?:先生|女士|总经理|董事长|经理)|(?:Mr|Ms|Mrs|Dr)\.\s[A-Z][a-z]+(?:\s[A-Z][a-z]+)?",
            )?
            .accept(|s| !s.contains("公司") && !s.contains("银行")),
        );
        rules.push(dictionary_rule(EntityType::Event, EVENT_TERMS)?);
        rules.push(dictionary_rule(EntityType::Product, PRODUCT_TERMS)?);

        Ok(Self { rules })
    }

    /// Extractor whose gazetteer covers every location in the timezone table
    pub fn from_config(config: &TemporalConfig) -> Result<Self> {
        let locations = config
            .timezones
            .keys()
            .map(String::as_str)
            .chain(EXTRA_LOCATIONS.iter().copied());
        Self::new(locations)
    }

    /// Extract entities from `text`, merging overlaps in favor of the longer span
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let chars = CharMap::new(text);
        let mut found = Vec::new();

        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let Some(m) = caps.get(rule.group) else {
                    continue;
                };
                let matched = m.as_str().trim();
                if matched.is_empty() || rule.accept.map_or(false, |accept| !accept(matched)) {
                    continue;
                }

                // Trim surrounding whitespace from the span as well as the text
                let lead = m.as_str().len() - m.as_str().trim_start().len();
                let byte_start = m.start() + lead;
                let (start, end) = chars.span(byte_start, byte_start + matched.len());

                if let Ok(entity) = Entity::new(matched, rule.entity_type.clone(), start, end) {
                    found.push(
                        entity
                            .with_confidence(rule.confidence)
                            .with_metadata("source", "rule"),
                    );
                }
            }
        }

        let merged = merge_overlapping(found);
        debug!("Rule extraction found {} entities", merged.len());
        merged
    }
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::from_config(&TemporalConfig::default()).expect("built-in rules are valid")
    }
}

fn gazetteer_regex<I, S>(locations: I) -> Result<Option<Rule>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = locations
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(None);
    }
    // Longest first so "New York City" beats "New York"
    names.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

    let alternatives: Vec<String> = names
        .iter()
        .map(|name| {
            let escaped = regex::escape(name);
            if name.is_ascii() {
                format!(r"\b{}\b", escaped)
            } else {
                escaped
            }
        })
        .collect();

    Ok(Some(Rule::new(
        EntityType::Geo,
        &format!("(?i)(?:{})", alternatives.join("|")),
    )?))
}

fn dictionary_rule(entity_type: EntityType, terms: &[&str]) -> Result<Rule> {
    let alternatives: Vec<String> = terms.iter().map(|t| regex::escape(t)).collect();
    Ok(Rule::new(entity_type, &alternatives.join("|"))?.confidence(DICTIONARY_CONFIDENCE))
}

/// Resolve overlapping entities, keeping the longer span
///
/// Ties keep whichever was found first (rule order). Output is sorted by start.
pub fn merge_overlapping(mut entities: Vec<Entity>) -> Vec<Entity> {
    // Stable sort keeps rule order among identical spans
    entities.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut merged: Vec<Entity> = Vec::with_capacity(entities.len());
    for entity in entities {
        match merged.last_mut() {
            Some(last) if entity.start < last.end => {
                if entity.end - entity.start > last.end - last.start {
                    *last = entity;
                }
            }
            _ => merged.push(entity),
        }
    }
    merged
}

/// Numeric value of a money mention (`5,000.00元`, `1.5万元`, `$20K`, `USD 300`)
///
/// Currency is not converted.
pub fn parse_money(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..number_len].replace(',', "").parse().ok()?;

    let multiplier = match rest[number_len..].trim_start().chars().next() {
        Some('万') => 1e4,
        Some('亿') => 1e8,
        Some('千') => 1e3,
        Some('百') => 1e2,
        Some('K') => 1e3,
        Some('M') => 1e6,
        Some('B') => 1e9,
        _ => 1.0,
    };
    Some(value * multiplier)
}
