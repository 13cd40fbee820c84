//! Learning state on disk
//!
//! Three JSON documents live in the data directory, each wrapped as
//! `{"version": 1, "data": ...}`:
//!
//! - `entity_patterns.json`: the full pattern library
//! - `pattern_weights.json`: pattern key -> weight (authoritative for weights)
//! - `feedback_history.json`: the append-only feedback history
//!
//! Writes go to a temp file in the same directory which is then renamed over
//! the target. A missing file loads as empty state.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::LearningConfig;
use crate::error::{Error, Result};
use crate::feedback::{FeedbackLoop, FeedbackRecord};
use crate::patterns::{Pattern, PatternStore};

pub const STATE_VERSION: u32 = 1;

pub const PATTERNS_FILE: &str = "entity_patterns.json";
pub const WEIGHTS_FILE: &str = "pattern_weights.json";
pub const FEEDBACK_FILE: &str = "feedback_history.json";

#[derive(Serialize, Deserialize)]
struct Versioned<T> {
    version: u32,
    data: T,
}

/// Versioned JSON state in one directory
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the pattern library, then overlay the persisted weights
    pub fn load_patterns(&self, config: LearningConfig) -> Result<PatternStore> {
        let patterns: Vec<Pattern> = self.read(PATTERNS_FILE)?.unwrap_or_default();
        let weights: BTreeMap<String, f64> = self.read(WEIGHTS_FILE)?.unwrap_or_default();

        let store = PatternStore::from_patterns(config, patterns)?;
        store.apply_weights(&weights)?;
        debug!("Loaded {} patterns from {}", store.len(), self.dir.display());
        Ok(store)
    }

    pub fn save_patterns(&self, store: &PatternStore) -> Result<()> {
        self.write(PATTERNS_FILE, &store.patterns(None))?;
        self.write(WEIGHTS_FILE, &store.weights())?;
        info!("Saved {} patterns to {}", store.len(), self.dir.display());
        Ok(())
    }

    pub fn load_feedback(&self, store: Arc<PatternStore>) -> Result<FeedbackLoop> {
        let history: Vec<FeedbackRecord> = self.read(FEEDBACK_FILE)?.unwrap_or_default();
        Ok(FeedbackLoop::with_history(store, history))
    }

    pub fn save_feedback(&self, feedback: &FeedbackLoop) -> Result<()> {
        self.write(FEEDBACK_FILE, &feedback.history())
    }

    /// Read one document; `None` if the file does not exist
    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let doc: Versioned<T> = serde_json::from_str(&content)?;
        if doc.version != STATE_VERSION {
            return Err(Error::InvalidData(format!(
                "{} has version {}, expected {}",
                path.display(),
                doc.version,
                STATE_VERSION
            )));
        }
        Ok(Some(doc.data))
    }

    /// Atomically replace one document
    fn write<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let doc = Versioned {
            version: STATE_VERSION,
            data,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, &doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.dir.join(name)).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
