//! Drives the `buildr` binary against a shell script standing in for clang.
//!
//! The script writes whatever `-o` names, fails on sources containing
//! `BROKEN`, and produces a runnable shell script when linking.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const FAKE_CLANG: &str = r#"#!/bin/sh
out=""
prev=""
compile=0
for arg in "$@"; do
    if [ "$prev" = "-o" ]; then out="$arg"; fi
    case "$arg" in
        -c|--precompile) compile=1 ;;
    esac
    prev="$arg"
done
if [ "$compile" = 1 ]; then
    if grep -q BROKEN "$prev"; then
        echo "$prev:1:1: error: unknown type name 'BROKEN'" >&2
        exit 1
    fi
    echo object > "$out"
else
    printf '#!/bin/sh\necho "hello from app $*"\n' > "$out"
    chmod +x "$out"
fi
"#;

fn buildr() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_buildr"))
}

fn create_project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let clang = dir.path().join("fake-clang");
    fs::write(&clang, FAKE_CLANG).unwrap();
    fs::set_permissions(&clang, fs::Permissions::from_mode(0o755)).unwrap();

    fs::write(
        dir.path().join("buildr.toml"),
        format!(
            "[package]\nname = \"app\"\n\n[build]\ncompiler = \"{}\"\njobs = 2\n",
            clang.display()
        ),
    )
    .unwrap();

    fs::create_dir_all(dir.path().join("src")).unwrap();
    for (name, text) in files {
        fs::write(dir.path().join("src").join(name), text).unwrap();
    }
    dir
}

fn run(project: &Path, args: &[&str]) -> Output {
    Command::new(buildr())
        .arg("-C")
        .arg(project)
        .args(args)
        .output()
        .expect("Failed to execute buildr")
}

const HELLO: &[(&str, &str)] = &[
    ("hello.cppm", "export module hello;\nexport void greet();\n"),
    ("main.cpp", "import hello;\nint main() { greet(); }\n"),
];

#[test]
fn test_build_succeeds_and_writes_compile_commands() {
    let project = create_project(HELLO);
    let output = run(project.path(), &["build"]);

    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(project.path().join("build/debug/pcm/hello.pcm").exists());
    assert!(project.path().join("build/debug/app").exists());

    let db = fs::read_to_string(project.path().join("compile_commands.json")).unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&db).unwrap();
    assert_eq!(records.len(), 3);
}

#[test]
fn test_second_build_is_up_to_date() {
    let project = create_project(HELLO);
    assert!(run(project.path(), &["build"]).status.success());

    let output = run(project.path(), &["build"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Up to date"));
}

#[test]
fn test_compile_failure_exits_non_zero_with_summary() {
    let project = create_project(&[
        ("hello.cppm", "export module hello;\nBROKEN x;\n"),
        ("main.cpp", "import hello;\nint main() {}\n"),
    ]);
    let output = run(project.path(), &["build"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("Build failed"));
    assert!(stdout.contains("unknown type name 'BROKEN'"));
    assert!(stdout.contains("src/main.cpp"));
    assert!(!project.path().join("build/debug/app").exists());
}

#[test]
fn test_run_passes_arguments() {
    let project = create_project(HELLO);
    let output = run(project.path(), &["run", "--", "world"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hello from app world"));
}

#[test]
fn test_graph_lists_modules() {
    let project = create_project(HELLO);
    let output = run(project.path(), &["graph"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("hello"));
    assert!(stdout.contains("interface"));
    assert!(stdout.contains("src/main.cpp"));
}

#[test]
fn test_cycle_is_reported_without_building() {
    let project = create_project(&[
        ("a.cppm", "export module a;\nimport b;\n"),
        ("b.cppm", "export module b;\nimport a;\n"),
    ]);
    let output = run(project.path(), &["build"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cycle"));
    assert!(!project.path().join("build").exists());
}

#[test]
fn test_clean_removes_outputs() {
    let project = create_project(HELLO);
    assert!(run(project.path(), &["build"]).status.success());

    let output = run(project.path(), &["clean"]);
    assert!(output.status.success());
    assert!(!project.path().join("build").exists());
    assert!(!project.path().join("compile_commands.json").exists());
}

#[test]
fn test_completion_generates_script() {
    let output = Command::new(buildr())
        .args(["completion", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("buildr"));
}
