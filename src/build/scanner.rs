//! Module declaration scanner.
//!
//! Recognizes `export module`, `module` and `import` declarations without a
//! full C++ parse. Comments are stripped first so commented-out imports do
//! not create graph edges. `#include` directives are never considered.

use super::unit::{Unit, UnitKind};
use crate::cache::digest_bytes;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*";

static MODULE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(export\s+)?module\s+({IDENT})\s*(?::\s*({IDENT}))?\s*(?:\[\[.*\]\])?\s*;"
    ))
    .expect("module declaration pattern is valid")
});

// `module;` opens the global module fragment, `module :private;` the private one.
static MODULE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^module\s*(?::\s*private\s*)?;").expect("fragment pattern is valid")
});

static MODULE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:export\s+)?import\s+({IDENT})\s*(?:\[\[.*\]\])?\s*;"))
        .expect("import pattern is valid")
});

static PARTITION_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:export\s+)?import\s*:\s*({IDENT})\s*;"))
        .expect("partition import pattern is valid")
});

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("malformed module declaration in {}: {reason}", .path.display())]
    MalformedModuleDeclaration { path: PathBuf, reason: String },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scan a file from disk.
pub fn scan_file(path: &Path) -> Result<Unit, ScanError> {
    let bytes = fs::read(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    scan_text(path, &text, digest_bytes(&bytes))
}

/// Scan every file, in parallel, keeping source-list order.
pub fn scan_files(paths: &[PathBuf]) -> Result<Vec<Unit>, ScanError> {
    paths.par_iter().map(|p| scan_file(p)).collect()
}

/// Scan in-memory source text. The digest is taken over `text`.
pub fn scan_source(path: impl Into<PathBuf>, text: &str) -> Result<Unit, ScanError> {
    let path = path.into();
    let digest = digest_bytes(text.as_bytes());
    scan_text(&path, text, digest)
}

struct Declaration {
    exported: bool,
    module: String,
    partition: Option<String>,
}

fn scan_text(path: &Path, text: &str, digest: String) -> Result<Unit, ScanError> {
    let malformed = |reason: String| ScanError::MalformedModuleDeclaration {
        path: path.to_path_buf(),
        reason,
    };

    let stripped = strip_comments(text);
    let mut declaration: Option<Declaration> = None;
    let mut imports: Vec<String> = Vec::new();
    let mut partition_imports: Vec<String> = Vec::new();

    for statement in statements(&stripped) {
        let line = statement.as_str();
        if MODULE_FRAGMENT.is_match(line) {
            continue;
        }

        if let Some(caps) = MODULE_DECL.captures(line) {
            let next = Declaration {
                exported: caps.get(1).is_some(),
                module: caps[2].to_string(),
                partition: caps.get(3).map(|m| m.as_str().to_string()),
            };
            if let Some(prev) = &declaration {
                return Err(malformed(format!(
                    "found a second module declaration `{}` after `{}`",
                    next.qualified(),
                    prev.qualified()
                )));
            }
            declaration = Some(next);
            continue;
        }

        if let Some(caps) = PARTITION_IMPORT.captures(line) {
            partition_imports.push(caps[1].to_string());
            continue;
        }

        if let Some(caps) = MODULE_IMPORT.captures(line) {
            push_unique(&mut imports, caps[1].to_string());
        }
    }

    let mut unit = Unit::plain(path, digest);

    match declaration {
        None => {
            if let Some(part) = partition_imports.first() {
                return Err(malformed(format!(
                    "partition import `:{part}` outside of a named module"
                )));
            }
        }
        Some(decl) => {
            for part in &partition_imports {
                push_unique(&mut imports, format!("{}:{}", decl.module, part));
            }
            match (decl.exported, &decl.partition) {
                (true, None) => {
                    unit.kind = UnitKind::ModuleInterfaceUnit;
                    unit.exports = Some(decl.module.clone());
                }
                (_, Some(_)) => {
                    unit.kind = UnitKind::ModulePartitionUnit;
                    unit.exports = Some(decl.qualified());
                }
                // `module foo;` implements foo and depends on its interface.
                (false, None) => {
                    push_unique(&mut imports, decl.module.clone());
                }
            }
        }
    }

    unit.imports = imports;
    Ok(unit)
}

impl Declaration {
    fn qualified(&self) -> String {
        match &self.partition {
            Some(part) => format!("{}:{}", self.module, part),
            None => self.module.clone(),
        }
    }
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

/// Split comment-free text into `;`-terminated statements with whitespace
/// collapsed, so declarations sharing a line or spanning several lines are
/// each seen once. Preprocessor lines are dropped, and a `{` or `}` starts
/// the statement afresh since no declaration contains a brace.
fn statements(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut line_start = true;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '#' if line_start => {
                let mut prev = c;
                for c in chars.by_ref() {
                    if c == '\n' && prev != '\\' {
                        break;
                    }
                    prev = c;
                }
                current.push(' ');
                continue;
            }
            '"' | '\'' => {
                current.push(c);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == c || inner == '\n' {
                        break;
                    }
                }
            }
            ';' => {
                current.push(';');
                let statement = current.split_whitespace().collect::<Vec<_>>().join(" ");
                if statement != ";" {
                    out.push(statement);
                }
                current.clear();
            }
            '{' | '}' => current.clear(),
            _ => current.push(c),
        }
        line_start = c == '\n' || (line_start && c.is_whitespace());
    }

    out
}

/// Replace comments with whitespace, keeping line structure intact.
/// String and character literals are skipped so `"//"` survives.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            '"' | '\'' => {
                out.push(c);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if inner == c || inner == '\n' {
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Unit {
        scan_source("src/unit.cpp", text).unwrap()
    }

    #[test]
    fn test_plain_file_has_no_module_metadata() {
        let unit = scan("#include <vector>\n#include \"local.hpp\"\nint main() { return 0; }\n");
        assert_eq!(unit.kind, UnitKind::PlainTranslationUnit);
        assert!(unit.exports.is_none());
        assert!(unit.imports.is_empty());
    }

    #[test]
    fn test_interface_unit() {
        let unit = scan(
            "module;\n#include <string>\nexport module math.core;\nimport std;\nexport import fmt;\n",
        );
        assert_eq!(unit.kind, UnitKind::ModuleInterfaceUnit);
        assert_eq!(unit.exports.as_deref(), Some("math.core"));
        assert_eq!(unit.imports, vec!["std", "fmt"]);
    }

    #[test]
    fn test_partition_units() {
        let exported = scan("export module app:net;\n");
        assert_eq!(exported.kind, UnitKind::ModulePartitionUnit);
        assert_eq!(exported.exports.as_deref(), Some("app:net"));

        let internal = scan("module app:detail;\n");
        assert_eq!(internal.kind, UnitKind::ModulePartitionUnit);
        assert_eq!(internal.exports.as_deref(), Some("app:detail"));
    }

    #[test]
    fn test_partition_import_is_qualified_with_own_module() {
        let unit = scan("export module app;\nexport import :net;\nimport :detail;\n");
        assert_eq!(unit.imports, vec!["app:net", "app:detail"]);
    }

    #[test]
    fn test_implementation_unit_imports_its_interface() {
        let unit = scan("module app;\nimport util;\n");
        assert_eq!(unit.kind, UnitKind::PlainTranslationUnit);
        assert!(unit.exports.is_none());
        assert_eq!(unit.imports, vec!["util", "app"]);
    }

    #[test]
    fn test_comments_and_header_units_are_ignored() {
        let unit = scan(
            "// import hidden;\n/* import also.hidden;\n export module nope; */\nimport <vector>;\nimport \"config.h\";\nimport real;\n",
        );
        assert_eq!(unit.kind, UnitKind::PlainTranslationUnit);
        assert_eq!(unit.imports, vec!["real"]);
    }

    #[test]
    fn test_string_literal_does_not_open_comment() {
        let unit = scan("const char* s = \"/*\";\nimport after;\n");
        assert_eq!(unit.imports, vec!["after"]);
    }

    #[test]
    fn test_declarations_sharing_a_line_are_all_seen() {
        let unit = scan("import a; import b;\nint main() {}\n");
        assert_eq!(unit.imports, vec!["a", "b"]);

        let unit = scan("export module m; import x; export import :part;\n");
        assert_eq!(unit.kind, UnitKind::ModuleInterfaceUnit);
        assert_eq!(unit.exports.as_deref(), Some("m"));
        assert_eq!(unit.imports, vec!["x", "m:part"]);
    }

    #[test]
    fn test_declaration_split_over_lines() {
        let unit = scan("export\n  module\n  net;\nimport\n    core\n;\n");
        assert_eq!(unit.exports.as_deref(), Some("net"));
        assert_eq!(unit.imports, vec!["core"]);
    }

    #[test]
    fn test_preprocessor_lines_and_bodies_do_not_hide_imports() {
        let unit = scan(
            "module;\n#define LONG_MACRO(x) \\\n    do { x; } while (0)\n#include <cstdio>\nexport module app;\nimport fmt;\nnamespace app { int f() { return 1; } }\n",
        );
        assert_eq!(unit.exports.as_deref(), Some("app"));
        assert_eq!(unit.imports, vec!["fmt"]);
    }

    #[test]
    fn test_semicolon_inside_string_is_not_a_boundary() {
        let unit = scan("const char* s = \"x; import fake;\";\nimport real;\n");
        assert_eq!(unit.imports, vec!["real"]);
    }

    #[test]
    fn test_duplicate_imports_collapse() {
        let unit = scan("import a;\nimport b;\nimport a;\n");
        assert_eq!(unit.imports, vec!["a", "b"]);
    }

    #[test]
    fn test_two_exports_are_malformed() {
        let err = scan_source("src/x.cppm", "export module a;\nexport module b;\n").unwrap_err();
        assert!(matches!(err, ScanError::MalformedModuleDeclaration { .. }));
        assert!(err.to_string().contains("`b`"));
    }

    #[test]
    fn test_interface_and_partition_markers_conflict() {
        let err = scan_source("src/x.cppm", "export module a;\nmodule a:b;\n").unwrap_err();
        assert!(matches!(err, ScanError::MalformedModuleDeclaration { .. }));
    }

    #[test]
    fn test_partition_import_without_module_is_malformed() {
        let err = scan_source("src/main.cpp", "import :part;\n").unwrap_err();
        assert!(matches!(err, ScanError::MalformedModuleDeclaration { .. }));
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = scan("int a;");
        let b = scan("int b;");
        assert_ne!(a.digest, b.digest);
        assert_eq!(a.digest, scan("int a;").digest);
    }

    #[test]
    fn test_scan_file_reports_missing_file() {
        let err = scan_file(Path::new("definitely/not/here.cpp")).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
