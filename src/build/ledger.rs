//! Command ledger and `compile_commands.json` emission.
//!
//! Entries are appended as jobs finish, so the ledger shows the order in
//! which work actually completed rather than the order it was handed out.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// One record of the compilation database. `skipped` marks cache hits and is
/// omitted from the output when false, keeping the standard four-field shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub directory: PathBuf,
    pub command: String,
    pub file: PathBuf,
    pub output: PathBuf,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skipped: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Default)]
pub struct CommandLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl CommandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: LedgerEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot in completion order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries())?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
