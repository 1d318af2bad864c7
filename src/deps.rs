//! System dependency discovery through pkg-config.

use crate::build::process::ProcessRunner;
use crate::config::Dependency;
use colored::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Flags contributed by `[dependencies]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyFlags {
    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
    /// Packages pkg-config could not resolve.
    pub missing: Vec<String>,
}

/// Resolve every dependency in name order. A package pkg-config does not
/// know is reported and skipped; the compiler will then fail with a
/// missing header, which the feedback hints explain.
pub fn resolve_dependencies(
    deps: &BTreeMap<String, Dependency>,
    pkg_config: &Path,
    runner: &dyn ProcessRunner,
) -> DependencyFlags {
    let mut flags = DependencyFlags::default();
    if deps.is_empty() {
        return flags;
    }
    println!("{} Resolving {} dependencies...", "📦".blue(), deps.len());

    for (name, dep) in deps {
        let pkg = dep.package_name(name);
        let resolved = if dep.modules().is_empty() {
            resolve_package(pkg, pkg_config, runner, &mut flags)
        } else {
            resolve_with_modules(pkg, dep.modules(), pkg_config, runner, &mut flags)
        };
        if !resolved {
            println!(
                "{} Package '{}' not found via pkg-config",
                "!".yellow(),
                pkg
            );
            flags.missing.push(pkg.to_string());
        }
    }
    flags
}

fn resolve_package(
    pkg: &str,
    pkg_config: &Path,
    runner: &dyn ProcessRunner,
    flags: &mut DependencyFlags,
) -> bool {
    let Some(cflags) = query(pkg_config, runner, &["--cflags", pkg]) else {
        return false;
    };
    let Some(libs) = query(pkg_config, runner, &["--libs", pkg]) else {
        return false;
    };
    flags
        .compile_args
        .extend(cflags.split_whitespace().map(ToOwned::to_owned));
    flags
        .link_args
        .extend(libs.split_whitespace().map(ToOwned::to_owned));
    true
}

/// Libraries split into per-module archives (boost style): include and
/// library dirs come from pkg-config variables, each module links as
/// `-l<pkg>_<module>`.
fn resolve_with_modules(
    pkg: &str,
    modules: &[String],
    pkg_config: &Path,
    runner: &dyn ProcessRunner,
    flags: &mut DependencyFlags,
) -> bool {
    let Some(includedir) = query(pkg_config, runner, &["--variable=includedir", pkg]) else {
        return false;
    };
    let Some(libdir) = query(pkg_config, runner, &["--variable=libdir", pkg]) else {
        return false;
    };
    if !includedir.is_empty() {
        flags.compile_args.push(format!("-I{}", includedir));
    }
    if !libdir.is_empty() {
        flags.link_args.push(format!("-L{}", libdir));
    }
    flags
        .link_args
        .extend(modules.iter().map(|m| format!("-l{}_{}", pkg, m)));
    true
}

fn query(pkg_config: &Path, runner: &dyn ProcessRunner, args: &[&str]) -> Option<String> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let output = runner.spawn(pkg_config, &args).ok()?;
    if !output.success() {
        return None;
    }
    Some(output.stdout.trim().to_string())
}
