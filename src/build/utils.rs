use crate::config::BuildrConfig;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "buildr.toml";

// --- Helper: Load buildr.toml from a project directory ---
pub fn load_config(project_dir: &Path) -> Result<BuildrConfig> {
    let path = project_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "{} not found in {}.\n\n\
            💡 Tip: create one with a [package] name and a [build] srcs list.",
            CONFIG_FILE,
            project_dir.display()
        ));
    }
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {} - check file permissions", path.display()))?;
    parse_config(&config_str)
}

pub fn parse_config(config_str: &str) -> Result<BuildrConfig> {
    toml::from_str(config_str).context(
        "Failed to parse buildr.toml - check for syntax errors (missing quotes, brackets)",
    )
}

/// Normalize an edition (`c++23`, `c++2b`, `-std=gnu++20`, ...) into a
/// clang `-std=` flag.
pub fn std_flag(edition: &str) -> String {
    let normalized = edition.to_lowercase();
    let edition_clean = normalized.strip_prefix("-std=").unwrap_or(&normalized);

    let canonical = match edition_clean {
        "c++20" | "c++2a" => "c++20",
        "c++23" | "c++2b" => "c++23",
        "c++26" | "c++2c" => "c++26",
        "gnu++20" | "gnu++2a" => "gnu++20",
        "gnu++23" | "gnu++2b" => "gnu++23",
        "gnu++26" | "gnu++2c" => "gnu++26",
        "latest" => "c++2c",
        other => other,
    };
    format!("-std={}", canonical)
}

/// Flags implied by the build profile.
pub fn profile_flags(release: bool) -> Vec<String> {
    if release {
        vec!["-O3".to_string()]
    } else {
        vec!["-g".to_string()]
    }
}

/// POSIX-quote one argument for display in a command line.
pub fn quote_arg(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

/// Render an argument vector as a single display string. Never executed.
pub fn render_command<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_flag_module_capable_standards() {
        assert_eq!(std_flag("c++20"), "-std=c++20");
        assert_eq!(std_flag("c++23"), "-std=c++23");
        assert_eq!(std_flag("c++26"), "-std=c++26");
        assert_eq!(std_flag("gnu++23"), "-std=gnu++23");
    }

    #[test]
    fn test_std_flag_aliases() {
        assert_eq!(std_flag("c++2a"), "-std=c++20");
        assert_eq!(std_flag("C++2B"), "-std=c++23");
        assert_eq!(std_flag("latest"), "-std=c++2c");
    }

    #[test]
    fn test_std_flag_strip_prefix() {
        assert_eq!(std_flag("-std=c++23"), "-std=c++23");
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("-fprebuilt-module-path=build/pcm"), "-fprebuilt-module-path=build/pcm");
        assert_eq!(quote_arg("has space"), "'has space'");
        assert_eq!(quote_arg("it's"), r"'it'\''s'");
        assert_eq!(quote_arg(""), "''");
        assert_eq!(quote_arg("a;rm -rf"), "'a;rm -rf'");
    }

    #[test]
    fn test_render_command() {
        let argv = ["clang++", "-DNAME=\"x y\"", "-c"];
        assert_eq!(render_command(&argv), r#"clang++ '-DNAME="x y"' -c"#);
    }

    #[test]
    fn test_missing_config_has_tip() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("buildr.toml not found"));
    }
}
