//! Pattern listing command

use anyhow::Result;
use finmine_core::{EntityType, Pattern, PatternStore};

use super::{truncate, Session};

pub fn cmd_patterns(session: &Session, entity_type: Option<&str>, all: bool) -> Result<()> {
    let store = session.load_patterns()?;
    let patterns = list_patterns(&store, entity_type, all);
    let stats = store.statistics();

    if patterns.is_empty() {
        if all {
            println!("No patterns learned yet.");
        } else {
            println!("No promoted patterns. Use --all to include weaker ones.");
        }
    } else {
        println!(
            "{:<8} {:<10} {:>6} {:>7} {:>6}  PATTERN",
            "KIND", "TYPE", "WEIGHT", "MATCHES", "RATE"
        );
        for p in &patterns {
            println!(
                "{:<8} {:<10} {:>6.2} {:>7} {:>5.0}%  {}",
                p.kind.as_str(),
                truncate(p.entity_type.as_str(), 10),
                p.weight,
                p.matches,
                p.success_rate * 100.0,
                truncate(&p.pattern, 60)
            );
        }
    }

    println!();
    println!(
        "Total: {} patterns ({} inert, {} high weight), average weight {:.2}",
        stats.total_patterns, stats.inert_patterns, stats.high_weight_patterns, stats.average_weight
    );

    Ok(())
}

/// Promoted patterns (or all of them), optionally for one entity type
pub fn list_patterns(store: &PatternStore, entity_type: Option<&str>, all: bool) -> Vec<Pattern> {
    let entity_type = entity_type.map(EntityType::from);
    if all {
        store.patterns(entity_type.as_ref())
    } else {
        store.promoted(entity_type.as_ref())
    }
}
