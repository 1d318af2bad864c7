//! Build artifact cleanup for `buildr clean`.

use super::utils::load_config;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

/// Remove the build root (all profiles, manifests included) and the
/// compile-command database copied to the project root.
pub fn clean(project_dir: &Path) -> Result<()> {
    let config = load_config(project_dir)?;
    let mut cleaned = false;

    let build_root = project_dir.join(&config.build.build_root);
    if build_root.exists() {
        fs::remove_dir_all(&build_root)
            .with_context(|| format!("Failed to remove {}", build_root.display()))?;
        println!("{} Removed {}", "🗑️".red(), config.build.build_root.display());
        cleaned = true;
    }

    let root_db = project_dir.join("compile_commands.json");
    if root_db.exists() {
        fs::remove_file(&root_db).context("Failed to remove compile_commands.json")?;
        cleaned = true;
    }

    if cleaned {
        println!("{} Clean complete.", "✓".green());
    } else {
        println!("{} Nothing to clean", "!".yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_build_root_and_database() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("buildr.toml"),
            "[package]\nname = \"app\"\n[build]\nbuild_root = \"out\"\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("out/debug/pcm")).unwrap();
        fs::write(dir.path().join("compile_commands.json"), "[]").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();

        clean(dir.path()).unwrap();

        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("compile_commands.json").exists());
        assert!(dir.path().join("src").exists());
    }

    #[test]
    fn test_clean_without_outputs_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("buildr.toml"), "[package]\nname = \"app\"\n").unwrap();
        assert!(clean(dir.path()).is_ok());
    }
}
