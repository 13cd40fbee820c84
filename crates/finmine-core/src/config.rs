//! Engine configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/finmine/config/engine.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Every section is `#[serde(default)]`, so an override file only needs the
//! keys it changes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/engine.toml");

/// Longest sliding window accepted for high-frequency detection (one leap year)
pub const MAX_WINDOW_MINUTES: i64 = 366 * 24 * 60;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub temporal: TemporalConfig,
    pub suspicious: SuspicionConfig,
    pub learning: LearningConfig,
    pub relations: RelationConfig,
}

/// Off-hours detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub business_start_hour: u32,
    pub business_end_hour: u32,
    pub context_window: usize,
    pub confidence: f64,
    /// Location text -> IANA timezone name
    pub timezones: BTreeMap<String, String>,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        let timezones = [
            ("New York", "America/New_York"),
            ("London", "Europe/London"),
            ("Tokyo", "Asia/Tokyo"),
            ("Singapore", "Asia/Singapore"),
            ("Hong Kong", "Asia/Hong_Kong"),
            ("Beijing", "Asia/Shanghai"),
            ("Shanghai", "Asia/Shanghai"),
            ("纽约", "America/New_York"),
            ("伦敦", "Europe/London"),
            ("东京", "Asia/Tokyo"),
            ("新加坡", "Asia/Singapore"),
            ("香港", "Asia/Hong_Kong"),
            ("北京", "Asia/Shanghai"),
            ("上海", "Asia/Shanghai"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            business_start_hour: 9,
            business_end_hour: 17,
            context_window: 50,
            confidence: 0.85,
            timezones,
        }
    }
}

/// Graph analytics thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionConfig {
    pub window_minutes: i64,
    pub min_transactions: usize,
    pub large_amount_threshold: f64,
    pub high_frequency_confidence: f64,
    pub large_amount_confidence: f64,
}

impl SuspicionConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.window_minutes)
    }
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            min_transactions: 3,
            large_amount_threshold: 10_000.0,
            high_frequency_confidence: 0.8,
            large_amount_confidence: 0.7,
        }
    }
}

/// Pattern learning constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Chars captured on each side of an entity for context patterns
    pub context_chars: usize,
    /// Size of the trailing metric window
    pub history_window: usize,
    /// Patterns at or below this weight are ignored during enhancement
    pub inert_threshold: f64,
    /// Patterns above this weight are "promoted"
    pub promote_threshold: f64,
    pub max_weight: f64,
    pub reinforce_factor: f64,
    pub penalize_factor: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            context_chars: 20,
            history_window: 100,
            inert_threshold: 0.5,
            promote_threshold: 1.0,
            max_weight: 2.0,
            reinforce_factor: 1.1,
            penalize_factor: 0.9,
        }
    }
}

/// How to orient a single-account transfer when transfer-in wording is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionPolicy {
    /// Reverse source and target
    #[default]
    Swap,
    /// Always keep document order
    Keep,
}

/// Transfer relation extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    pub context_window: usize,
    pub direction_policy: DirectionPolicy,
    pub transfer_in_keywords: Vec<String>,
    /// Regexes marking a transfer description
    pub transfer_triggers: Vec<String>,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            context_window: 50,
            direction_policy: DirectionPolicy::Swap,
            transfer_in_keywords: vec!["收到".into(), "转入".into(), "收款".into()],
            transfer_triggers: vec![
                r"(?:转账|汇款|支付|收款).*?(?:到|给|从)".into(),
                r"(?:收到|接收).*?(?:从|由)".into(),
                r"(?:转入|转出).*?(?:账户|卡)".into(),
                r"(?i)(?:transferred|sent|paid|wired)\s+.*?\b(?:to|from)\b".into(),
            ],
        }
    }
}

impl EngineConfig {
    /// Load configuration (explicit path or data-dir override, then embedded default)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let override_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let content = match override_path {
            Some(p) if p.exists() => {
                debug!("Loading engine config from {}", p.display());
                fs::read_to_string(&p).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", p.display(), e))
                })?
            }
            Some(p) if path.is_some() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            _ => DEFAULT_CONFIG.to_string(),
        };

        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the algorithms cannot work with
    pub fn validate(&self) -> Result<()> {
        let t = &self.temporal;
        if t.business_start_hour >= t.business_end_hour || t.business_end_hour > 24 {
            return Err(Error::Config(format!(
                "business hours must satisfy start < end <= 24 (got {}..{})",
                t.business_start_hour, t.business_end_hour
            )));
        }

        let s = &self.suspicious;
        let l = &self.learning;
        for (name, value) in [
            ("temporal.confidence", t.confidence),
            ("large_amount_threshold", s.large_amount_threshold),
            ("high_frequency_confidence", s.high_frequency_confidence),
            ("large_amount_confidence", s.large_amount_confidence),
            ("inert_threshold", l.inert_threshold),
            ("promote_threshold", l.promote_threshold),
            ("max_weight", l.max_weight),
            ("reinforce_factor", l.reinforce_factor),
            ("penalize_factor", l.penalize_factor),
        ] {
            if !value.is_finite() {
                return Err(Error::Config(format!("{} must be a finite number", name)));
            }
        }
        for (name, value) in [
            ("temporal.confidence", t.confidence),
            ("high_frequency_confidence", s.high_frequency_confidence),
            ("large_amount_confidence", s.large_amount_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be in [0, 1]", name)));
            }
        }

        if s.window_minutes <= 0 || s.window_minutes > MAX_WINDOW_MINUTES {
            return Err(Error::Config(format!(
                "window_minutes must be in 1..={} (got {})",
                MAX_WINDOW_MINUTES, s.window_minutes
            )));
        }
        if s.min_transactions < 2 {
            return Err(Error::Config("min_transactions must be at least 2".into()));
        }
        if s.large_amount_threshold < 0.0 {
            return Err(Error::Config(
                "large_amount_threshold must not be negative".into(),
            ));
        }

        if l.penalize_factor <= 0.0 || l.penalize_factor >= 1.0 {
            return Err(Error::Config("penalize_factor must be in (0, 1)".into()));
        }
        if l.reinforce_factor < 1.0 {
            return Err(Error::Config("reinforce_factor must be >= 1".into()));
        }
        if l.max_weight <= 0.0 {
            return Err(Error::Config("max_weight must be positive".into()));
        }
        if l.history_window == 0 {
            return Err(Error::Config("history_window must be positive".into()));
        }

        Ok(())
    }
}

/// Default data directory for learning state
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("finmine"))
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    default_data_dir().map(|d| d.join("config").join("engine.toml"))
}
