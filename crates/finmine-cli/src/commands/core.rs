//! Shared command state and small utility commands
//!
//! This module contains:
//! - `Session` - Resolved data directory, engine config and state store
//! - `cmd_parse_time` - Debugging aid for the date/time parser

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use finmine_core::config::default_data_dir;
use finmine_core::{parse_time, EngineConfig, FeedbackLoop, PatternStore, Pipeline, StateStore};
use tracing::debug;

/// Config file looked up inside the data directory
const CONFIG_FILE: &str = "config/engine.toml";

/// Everything a command needs to reach the learning state
pub struct Session {
    pub data_dir: PathBuf,
    pub config: EngineConfig,
    pub state: StateStore,
}

impl Session {
    /// Resolve the data directory and load the engine config
    ///
    /// Config priority: `--config` > `<data_dir>/config/engine.toml` > built-in defaults.
    pub fn new(data_dir: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_data_dir()
                .context("Could not determine a data directory; pass --data-dir")?,
        };

        let config = match config_path {
            Some(path) => EngineConfig::load(Some(path))
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let local = data_dir.join(CONFIG_FILE);
                if local.exists() {
                    EngineConfig::load(Some(&local))
                        .with_context(|| format!("Failed to load config {}", local.display()))?
                } else {
                    EngineConfig::default()
                }
            }
        };

        debug!("Using data directory {}", data_dir.display());
        Ok(Self {
            state: StateStore::new(&data_dir),
            data_dir,
            config,
        })
    }

    /// Learned patterns with persisted weights applied
    pub fn load_patterns(&self) -> Result<Arc<PatternStore>> {
        let store = self
            .state
            .load_patterns(self.config.learning.clone())
            .context("Failed to load learned patterns")?;
        Ok(Arc::new(store))
    }

    /// Feedback loop over the persisted history
    pub fn load_feedback(&self, store: Arc<PatternStore>) -> Result<FeedbackLoop> {
        self.state
            .load_feedback(store)
            .context("Failed to load feedback history")
    }

    pub fn pipeline(&self, patterns: Arc<PatternStore>) -> Result<Pipeline> {
        Pipeline::new(&self.config, patterns).context("Failed to build pipeline")
    }
}

pub fn cmd_parse_time(text: &str) -> Result<()> {
    let parsed = parse_time(text).with_context(|| format!("Could not parse '{}'", text))?;
    println!("{}", parsed.to_rfc3339());
    Ok(())
}
