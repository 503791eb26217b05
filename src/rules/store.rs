//! Rule list persistence

use super::types::Rule;
use crate::error::{ProxyError, Result};
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Backing storage for the rule list
pub trait RuleStore: Send + Sync + Debug {
    /// Load the persisted list
    ///
    /// `Ok(None)` means nothing usable is stored (absent or corrupted) and
    /// the caller should fall back to defaults.
    fn load(&self) -> Result<Option<Vec<Rule>>>;

    /// Replace the persisted list
    fn save(&self, rules: &[Rule]) -> Result<()>;
}

/// JSON array of rules in a single file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Rule>>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No rule file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!("Corrupted rule file {:?}: {}", self.path, e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Vec<Rule>>(&content) {
            Ok(rules) => Ok(Some(rules)),
            Err(e) => {
                warn!("Corrupted rule file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    fn save(&self, rules: &[Rule]) -> Result<()> {
        let json = serde_json::to_string_pretty(rules)
            .map_err(|e| ProxyError::Config(format!("Failed to serialize rules: {}", e)))?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store, used when no rules path is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    rules: Mutex<Option<Vec<Rule>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        MemoryStore {
            rules: Mutex::new(Some(rules)),
        }
    }
}

impl RuleStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<Rule>>> {
        Ok(self.rules.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, rules: &[Rule]) -> Result<()> {
        *self.rules.lock().unwrap_or_else(|e| e.into_inner()) = Some(rules.to_vec());
        Ok(())
    }
}
