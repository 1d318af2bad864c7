use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct BuildrConfig {
    pub package: PackageConfig,
    #[serde(default)]
    pub build: BuildConfig,
    /// Ordered by name so discovery flags are stable between runs.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Dependency>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct PackageConfig {
    pub name: String,
    #[serde(default = "default_edition")]
    pub edition: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BuildConfig {
    /// Explicit source list. When empty, `src/` is walked.
    #[serde(default)]
    pub srcs: Vec<PathBuf>,
    #[serde(default)]
    pub compile_args: Vec<String>,
    #[serde(default)]
    pub link_args: Vec<String>,
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,
    #[serde(default = "default_compiler")]
    pub compiler: PathBuf,
    /// Defaults to the compiler driver.
    pub linker: Option<PathBuf>,
    #[serde(default = "default_pkg_config")]
    pub pkg_config: PathBuf,
    pub jobs: Option<usize>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub strict_imports: bool,
    #[serde(default = "default_external_modules")]
    pub external_modules: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            srcs: Vec::new(),
            compile_args: Vec::new(),
            link_args: Vec::new(),
            build_root: default_build_root(),
            compiler: default_compiler(),
            linker: None,
            pkg_config: default_pkg_config(),
            jobs: None,
            fail_fast: false,
            strict_imports: false,
            external_modules: default_external_modules(),
        }
    }
}

impl BuildConfig {
    pub fn linker(&self) -> PathBuf {
        self.linker.clone().unwrap_or_else(|| self.compiler.clone())
    }
}

/// `fmt = "*"` or `boost = { modules = ["program_options"] }`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Dependency {
    Simple(String),
    Complex {
        #[serde(default)]
        modules: Vec<String>,
        /// pkg-config package name when it differs from the key.
        pkg: Option<String>,
    },
}

impl Dependency {
    pub fn modules(&self) -> &[String] {
        match self {
            Dependency::Simple(_) => &[],
            Dependency::Complex { modules, .. } => modules,
        }
    }

    pub fn package_name<'a>(&'a self, key: &'a str) -> &'a str {
        match self {
            Dependency::Complex { pkg: Some(pkg), .. } => pkg,
            _ => key,
        }
    }
}

fn default_edition() -> String {
    "c++23".to_string()
}

fn default_build_root() -> PathBuf {
    PathBuf::from("build")
}

fn default_compiler() -> PathBuf {
    PathBuf::from("clang++")
}

fn default_pkg_config() -> PathBuf {
    PathBuf::from("pkg-config")
}

fn default_external_modules() -> Vec<String> {
    vec!["std".to_string(), "std.compat".to_string()]
}
