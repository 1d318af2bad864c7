use std::fmt;
use std::path::{Path, PathBuf};

/// Index of a unit inside the source list (and the dependency graph).
pub type UnitId = usize;

/// What a source file contributes to the module graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Ordinary `.cpp` file, possibly importing modules but exporting none.
    PlainTranslationUnit,
    /// `export module name;`
    ModuleInterfaceUnit,
    /// `export module name:part;` or `module name:part;`
    ModulePartitionUnit,
}

impl UnitKind {
    /// Module kinds are precompiled into an interface artifact.
    pub fn is_module(self) -> bool {
        matches!(
            self,
            UnitKind::ModuleInterfaceUnit | UnitKind::ModulePartitionUnit
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            UnitKind::PlainTranslationUnit => "plain",
            UnitKind::ModuleInterfaceUnit => "interface",
            UnitKind::ModulePartitionUnit => "partition",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One scanned source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub path: PathBuf,
    pub kind: UnitKind,
    /// Module name this unit makes available. Partitions use `module:part`.
    pub exports: Option<String>,
    /// Imported module names, deduplicated, in declaration order.
    pub imports: Vec<String>,
    /// SHA-256 of the source bytes at scan time.
    pub digest: String,
}

impl Unit {
    pub fn plain(path: impl Into<PathBuf>, digest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: UnitKind::PlainTranslationUnit,
            exports: None,
            imports: Vec::new(),
            digest: digest.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Human readable name: the exported module if any, the path otherwise.
    pub fn display_name(&self) -> String {
        match &self.exports {
            Some(name) => name.clone(),
            None => self.path.display().to_string(),
        }
    }
}
