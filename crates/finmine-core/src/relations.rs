//! Relation extraction
//!
//! Transfer relations are found around trigger phrases (转账…到, 收到…从,
//! "sent … to"). Accounts overlapping the trigger's context window and money
//! fully inside it become the endpoints:
//!
//! - two or more accounts: `TRANSFER_TO` from the first to the second, in
//!   document order
//! - one account: `HAS_AMOUNT` from the account to the money, with a
//!   `direction` of `out`, or `in` when the direction policy is `swap` and
//!   transfer-in wording (收到, 转入, 收款) appears in the window
//!
//! Ownership phrases (属于, 名下, 实际控制人) link nearby PERSON and ORG
//! entities with `BELONGS_TO`.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::config::{DirectionPolicy, RelationConfig};
use crate::error::Result;
use crate::models::{Entity, EntityType, Relation, RelationType};
use crate::text::CharMap;

const TRANSFER_CONFIDENCE: f64 = 0.9;
const SINGLE_ACCOUNT_CONFIDENCE: f64 = 0.7;
const OWNERSHIP_CONFIDENCE: f64 = 0.8;

const OWNERSHIP_TRIGGERS: &[&str] = &[
    r"(?:属于|所有|持有|拥有)",
    r"(?:的账户|的卡|名下)",
    r"(?:法定代表人|实际控制人|受益人)",
];

/// Money flow direction for a single-account transfer
pub const DIRECTION_IN: &str = "in";
pub const DIRECTION_OUT: &str = "out";

pub struct RelationExtractor {
    config: RelationConfig,
    transfer_triggers: Vec<Regex>,
    ownership_triggers: Vec<Regex>,
}

impl RelationExtractor {
    pub fn new(config: RelationConfig) -> Result<Self> {
        let transfer_triggers = config
            .transfer_triggers
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let ownership_triggers = OWNERSHIP_TRIGGERS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            transfer_triggers,
            ownership_triggers,
        })
    }

    /// All relations found in `text` among `entities`
    pub fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relation> {
        let chars = CharMap::new(text);
        let mut seen = HashSet::new();
        let mut relations = Vec::new();

        for relation in self
            .transfer_relations(&chars, text, entities)
            .into_iter()
            .chain(self.ownership_relations(&chars, text, entities))
        {
            let key = (
                relation.relation_type.clone(),
                relation.source.span(),
                relation.target.span(),
            );
            if seen.insert(key) {
                relations.push(relation);
            }
        }

        debug!("Found {} relations", relations.len());
        relations
    }

    /// Char windows around every trigger match
    fn windows(&self, triggers: &[Regex], chars: &CharMap<'_>, text: &str) -> Vec<(usize, usize)> {
        let radius = self.config.context_window;
        triggers
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(|m| {
                let (start, end) = chars.span(m.start(), m.end());
                (start.saturating_sub(radius), end.saturating_add(radius))
            })
            .collect()
    }

    fn transfer_relations(&self, chars: &CharMap<'_>, text: &str, entities: &[Entity]) -> Vec<Relation> {
        let mut out = Vec::new();

        for (ws, we) in self.windows(&self.transfer_triggers, chars, text) {
            let accounts: Vec<&Entity> = entities
                .iter()
                .filter(|e| e.entity_type == EntityType::Account && e.end >= ws && e.start <= we)
                .collect();
            let Some(amount) = first_within(entities, EntityType::Money, ws, we) else {
                continue;
            };
            let date = first_within(entities, EntityType::Date, ws, we);
            let context = chars.slice(ws, we);

            let relation = match accounts.as_slice() {
                [] => continue,
                [account] => {
                    let incoming = self.config.direction_policy == DirectionPolicy::Swap
                        && self
                            .config
                            .transfer_in_keywords
                            .iter()
                            .any(|k| context.contains(k.as_str()));
                    Relation::new(RelationType::HasAmount, (*account).clone(), amount.clone())
                        .map(|r| {
                            r.with_confidence(SINGLE_ACCOUNT_CONFIDENCE).with_metadata(
                                "direction",
                                if incoming { DIRECTION_IN } else { DIRECTION_OUT },
                            )
                        })
                }
                [source, target, ..] => {
                    Relation::new(RelationType::TransferTo, (*source).clone(), (*target).clone())
                        .map(|r| r.with_confidence(TRANSFER_CONFIDENCE))
                }
            };

            let Ok(mut relation) = relation else {
                continue;
            };
            relation = relation
                .with_metadata("amount", amount.text.clone())
                .with_metadata("context", context);
            if let Some(date) = date {
                relation = relation.with_metadata("date", date.text.clone());
            }
            out.push(relation);
        }

        out
    }

    fn ownership_relations(&self, chars: &CharMap<'_>, text: &str, entities: &[Entity]) -> Vec<Relation> {
        let mut out = Vec::new();

        for (ws, we) in self.windows(&self.ownership_triggers, chars, text) {
            for org in all_within(entities, EntityType::Org, ws, we) {
                for person in all_within(entities, EntityType::Person, ws, we) {
                    if let Ok(r) =
                        Relation::new(RelationType::BelongsTo, person.clone(), org.clone())
                    {
                        out.push(
                            r.with_confidence(OWNERSHIP_CONFIDENCE)
                                .with_metadata("context", chars.slice(ws, we)),
                        );
                    }
                }
            }
        }

        out
    }
}

impl Default for RelationExtractor {
    fn default() -> Self {
        Self::new(RelationConfig::default()).expect("built-in triggers are valid regexes")
    }
}

/// Entities of one type lying fully inside the char window `[ws, we]`
fn all_within(
    entities: &[Entity],
    entity_type: EntityType,
    ws: usize,
    we: usize,
) -> impl Iterator<Item = &Entity> {
    entities
        .iter()
        .filter(move |e| e.entity_type == entity_type && e.start >= ws && e.end <= we)
}

fn first_within(entities: &[Entity], entity_type: EntityType, ws: usize, we: usize) -> Option<&Entity> {
    all_within(entities, entity_type, ws, we).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::RuleExtractor;

    fn relations_for(text: &str, config: RelationConfig) -> Vec<Relation> {
        let entities = RuleExtractor::default().extract(text);
        RelationExtractor::new(config).unwrap().extract(text, &entities)
    }

    #[test]
    fn test_two_account_transfer() {
        let text = "账户6222021234567890123转账5000.00元到账户6222029876543210987";
        let relations = relations_for(text, RelationConfig::default());

        assert_eq!(relations.len(), 1);
        let r = &relations[0];
        assert_eq!(r.relation_type, RelationType::TransferTo);
        assert_eq!(r.source.text, "6222021234567890123");
        assert_eq!(r.target.text, "6222029876543210987");
        assert_eq!(r.confidence, 0.9);
        assert_eq!(r.metadata.get("amount").map(String::as_str), Some("5000.00元"));
    }

    #[test]
    fn test_single_account_incoming_with_swap() {
        let text = "账户6222021234567890123收到从外部汇来的8000元";
        let relations = relations_for(text, RelationConfig::default());

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relation_type, RelationType::HasAmount);
        assert_eq!(
            relations[0].metadata.get("direction").map(String::as_str),
            Some(DIRECTION_IN)
        );
    }

    #[test]
    fn test_keep_policy_never_reorients() {
        let text = "账户6222021234567890123收到从外部汇来的8000元";
        let config = RelationConfig {
            direction_policy: DirectionPolicy::Keep,
            ..Default::default()
        };
        let relations = relations_for(text, config);
        assert_eq!(
            relations[0].metadata.get("direction").map(String::as_str),
            Some(DIRECTION_OUT)
        );
    }

    #[test]
    fn test_no_amount_no_relation() {
        let text = "账户6222021234567890123转账到账户6222029876543210987";
        assert!(relations_for(text, RelationConfig::default()).is_empty());
    }

    #[test]
    fn test_english_trigger() {
        let text = "Account A001 sent $500 to account B002 on 2024-06-10";
        let relations = relations_for(text, RelationConfig::default());
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].source.text, "A001");
        assert_eq!(relations[0].target.text, "B002");
        assert_eq!(relations[0].metadata.get("date").map(String::as_str), Some("2024-06-10"));
    }
}
