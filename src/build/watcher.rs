use super::core::{self, BuildOptions};
use anyhow::Result;
use colored::*;
use notify::{Config, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

/// Rebuild whenever something under `src/` or `buildr.toml` changes. Each
/// rebuild rescans and builds a fresh graph; only the artifact cache
/// carries over, through the fingerprint manifest.
pub fn watch(project_dir: &Path, options: &BuildOptions) -> Result<()> {
    println!("{} Watching for changes in src/...", "👀".cyan());

    let (tx, rx) = channel();
    let config_notify = Config::default().with_poll_interval(Duration::from_secs(1));
    let mut watcher = notify::RecommendedWatcher::new(tx, config_notify)?;

    watcher.watch(&project_dir.join("src"), RecursiveMode::Recursive)?;
    let manifest: PathBuf = project_dir.join(super::utils::CONFIG_FILE);
    if manifest.exists() {
        watcher.watch(&manifest, RecursiveMode::NonRecursive)?;
    }

    rebuild(project_dir, options);

    while rx.recv().is_ok() {
        // Debounce bursts of events from editors writing several files.
        std::thread::sleep(Duration::from_millis(100));
        while rx.try_recv().is_ok() {}
        print!("\x1B[2J\x1B[1;1H");
        println!("{} File changed. Rebuilding...", "🔄".yellow());
        rebuild(project_dir, options);
    }
    Ok(())
}

fn rebuild(project_dir: &Path, options: &BuildOptions) {
    if let Err(e) = core::build_project(project_dir, options) {
        println!("{} Error: {}", "x".red(), e);
    }
}
