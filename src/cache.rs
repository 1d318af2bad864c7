//! Artifact cache keyed by content fingerprints.
//!
//! A fingerprint covers a unit's source bytes, the full compiler argument
//! vector and the fingerprints of every direct dependency, so changing an
//! imported interface invalidates all of its importers.
//!
//! The cache lives for one build but can be loaded from and saved to a
//! manifest under the build directory, which lets a second run with identical
//! inputs skip every job.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const MANIFEST_VERSION: u32 = 1;

/// Hex SHA-256 of a byte slice.
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `content` is the source digest (or a fixed tag for the link step),
    /// `argv` the program followed by its arguments.
    pub fn compute(content: &str, argv: &[String], deps: &[&Fingerprint]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
        for arg in argv {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([1u8]);
        for dep in deps {
            hasher.update(dep.0.as_bytes());
            hasher.update([0u8]);
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Object,
    ModuleInterface,
    Executable,
}

/// A file produced by a compile or link job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: BTreeMap<Fingerprint, Artifact>,
}

/// Read-through, write-through cache shared between the scheduler and its
/// workers. No eviction.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: Mutex<HashMap<Fingerprint, Artifact>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hit whose file has gone missing is reported as a miss.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Artifact> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(fingerprint)
            .filter(|artifact| artifact.exists())
            .cloned()
    }

    /// Each artifact path holds exactly one build output, so storing a new
    /// fingerprint for a path forgets every older fingerprint for it.
    pub fn store(&self, fingerprint: Fingerprint, artifact: Artifact) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|fp, existing| existing.path != artifact.path || *fp == fingerprint);
        entries.insert(fingerprint, artifact);
    }

    /// Forget every entry pointing at `path`. Called before a job overwrites
    /// the file, so a failed or interrupted run leaves no entry behind.
    pub fn evict_path(&self, path: &Path) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, existing| existing.path != path);
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

    /// Load a manifest written by [`ArtifactCache::save`]. A missing,
    /// unreadable or outdated manifest yields an empty cache. Paths claimed
    /// by more than one fingerprint are dropped; the file on disk can match
    /// at most one of them and there is no telling which.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        let manifest = match serde_json::from_str::<Manifest>(&content) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest,
            _ => return Self::default(),
        };

        let mut claims: HashMap<PathBuf, usize> = HashMap::new();
        for artifact in manifest.entries.values() {
            *claims.entry(artifact.path.clone()).or_default() += 1;
        }
        let entries = manifest
            .entries
            .into_iter()
            .filter(|(_, artifact)| claims.get(&artifact.path) == Some(&1))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Persist entries whose artifacts still exist.
    pub fn save(&self, path: &Path) -> Result<()> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            entries: entries
                .iter()
                .filter(|(_, artifact)| artifact.exists())
                .map(|(fp, artifact)| (fp.clone(), artifact.clone()))
                .collect(),
        };
        drop(entries);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write fingerprint manifest {}", path.display()))?;
        Ok(())
    }
}
