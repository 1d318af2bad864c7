use super::executor::{BuildLayout, Executor, ExecutorConfig, Toolchain};
use super::feedback::FeedbackAnalyzer;
use super::graph::{Graph, GraphOptions};
use super::ledger::{CommandLedger, LedgerEntry};
use super::process::{ProcessRunner, SystemRunner};
use super::scanner::scan_files;
use super::scheduler::{BuildReport, JobFailure, ScheduleOptions, Scheduler, default_workers};
use super::utils::{load_config, profile_flags, std_flag};
use crate::cache::ArtifactCache;
use crate::config::BuildrConfig;
use crate::deps::resolve_dependencies;
use anyhow::{Context, Result, bail};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Extensions picked up when `[build] srcs` is not given.
pub const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "cppm", "ixx", "mpp"];

/// Command-line overrides on top of `buildr.toml`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub release: bool,
    pub verbose: bool,
    pub jobs: Option<usize>,
    pub fail_fast: bool,
    pub strict: bool,
    /// Draw the progress bar and print compiler warnings.
    pub progress: bool,
}

/// Everything one build produced.
#[derive(Debug)]
pub struct BuildSession {
    pub project_dir: PathBuf,
    pub graph: Graph,
    pub report: BuildReport,
    pub layout: BuildLayout,
    /// Ledger snapshot, completion ordered.
    pub commands: Vec<LedgerEntry>,
    pub elapsed: Duration,
}

/// The ordered source list: `[build] srcs` as written, or every C++ source
/// under `src/` sorted by path.
pub fn discover_sources(project_dir: &Path, config: &BuildrConfig) -> Result<Vec<PathBuf>> {
    if !config.build.srcs.is_empty() {
        let mut sources = Vec::with_capacity(config.build.srcs.len());
        for src in &config.build.srcs {
            let path = project_dir.join(src);
            if !path.is_file() {
                bail!(
                    "Source file {} listed in buildr.toml does not exist",
                    src.display()
                );
            }
            sources.push(path);
        }
        return Ok(sources);
    }

    let src_dir = project_dir.join("src");
    let mut sources: Vec<PathBuf> = WalkDir::new(&src_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_string_lossy().as_ref()))
                .unwrap_or(false)
        })
        .collect();
    sources.sort();
    Ok(sources)
}

/// Scan every source and validate the module graph. Nothing is spawned.
pub fn load_graph(project_dir: &Path, config: &BuildrConfig, strict: bool) -> Result<Graph> {
    let sources = discover_sources(project_dir, config)?;
    if sources.is_empty() {
        bail!(
            "No source files found.\n\n\
            💡 Tip: list them in [build] srcs or put them under src/."
        );
    }
    let units = scan_files(&sources)?;
    let options = GraphOptions {
        strict: strict || config.build.strict_imports,
        external_modules: config.build.external_modules.clone(),
    };
    Ok(Graph::build(units, &options)?)
}

/// Run one build with an injected process runner.
pub fn build_with_runner(
    project_dir: &Path,
    config: &BuildrConfig,
    options: &BuildOptions,
    runner: Arc<dyn ProcessRunner>,
) -> Result<BuildSession> {
    let start_time = Instant::now();

    // Graph problems are reported before any process runs, pkg-config included.
    let graph = load_graph(project_dir, config, options.strict)?;

    let deps = resolve_dependencies(&config.dependencies, &config.build.pkg_config, runner.as_ref());

    let profile = if options.release { "release" } else { "debug" };
    let layout = BuildLayout::new(project_dir.join(&config.build.build_root).join(profile));
    layout
        .create_dirs()
        .with_context(|| format!("Failed to create {}", layout.dir().display()))?;

    let mut compile_args = vec![std_flag(&config.package.edition)];
    compile_args.extend(profile_flags(options.release));
    compile_args.extend(config.build.compile_args.iter().cloned());
    compile_args.extend(deps.compile_args);

    let mut link_args = config.build.link_args.clone();
    link_args.extend(deps.link_args);

    let executor = Executor::new(
        ExecutorConfig {
            toolchain: Toolchain {
                compiler: config.build.compiler.clone(),
                linker: config.build.linker(),
            },
            layout: layout.clone(),
            project_dir: project_dir.to_path_buf(),
            compile_args,
            link_args,
            output_name: config.package.name.clone(),
        },
        runner,
    );

    let cache = ArtifactCache::load(&layout.manifest_path());
    let ledger = CommandLedger::new();
    let schedule = ScheduleOptions {
        workers: options
            .jobs
            .or(config.build.jobs)
            .unwrap_or_else(default_workers),
        fail_fast: options.fail_fast || config.build.fail_fast,
        verbose: options.verbose,
        progress: options.progress,
    };

    let report = Scheduler::new(&graph, &executor, &cache, &ledger, schedule).run();

    let db = layout.compile_commands_path();
    ledger.write(&db)?;
    fs::copy(&db, project_dir.join("compile_commands.json"))
        .context("Failed to copy compile_commands.json to the project root")?;
    cache.save(&layout.manifest_path())?;

    Ok(BuildSession {
        project_dir: project_dir.to_path_buf(),
        graph,
        report,
        layout,
        commands: ledger.entries(),
        elapsed: start_time.elapsed(),
    })
}

// --- CORE: Build Project ---
pub fn build_project(project_dir: &Path, options: &BuildOptions) -> Result<Option<PathBuf>> {
    let config = load_config(project_dir)?;
    let runner = Arc::new(SystemRunner::new(project_dir));
    let session = build_with_runner(project_dir, &config, options, runner)?;
    print_summary(&session);
    Ok(session.report.executable.map(|a| a.path))
}

// --- COMMAND: Build & Run ---
pub fn build_and_run(project_dir: &Path, options: &BuildOptions, run_args: &[String]) -> Result<bool> {
    let Some(bin_path) = build_project(project_dir, options)? else {
        return Ok(false);
    };

    println!("{} Running...\n", "▶".green());
    let status = Command::new(&bin_path)
        .args(run_args)
        .current_dir(project_dir)
        .status()
        .with_context(|| format!("Failed to run {}", bin_path.display()))?;
    Ok(status.success())
}

pub fn print_summary(session: &BuildSession) {
    let report = &session.report;
    if report.success() {
        let compiled = report.executed.len();
        let cached = report.skipped.len();
        if compiled == 0 {
            println!("{} Up to date ({} cached)", "⚡".green(), cached);
        } else {
            println!(
                "{} Build finished in {:.2?} ({} compiled, {} cached)",
                "✓".green(),
                session.elapsed,
                compiled,
                cached
            );
        }
        return;
    }

    println!("\n{} Build failed", "x".red().bold());
    for failed in report.root_failures() {
        println!("\n{} {}", "x".red(), failed.cause);
        if let Some(stderr) = failed.cause.stderr() {
            for line in stderr.trim_end().lines() {
                println!("    {}", line);
            }
            if let Some(hint) = FeedbackAnalyzer::analyze(stderr) {
                println!("\n{} {}", "💡".yellow(), hint);
            }
        }
        let poisoned = report.poisoned_by(&failed.path);
        if !poisoned.is_empty() {
            println!("   {} Not built because of this failure:", "!".yellow());
            for job in poisoned {
                println!("     - {}", relative(&job.path, session));
            }
        }
    }

    let cancelled = report
        .failures
        .iter()
        .filter(|f| f.cause == JobFailure::Cancelled)
        .count();
    if cancelled > 0 {
        println!(
            "\n{} {} job(s) cancelled after the first failure (--fail-fast)",
            "!".yellow(),
            cancelled
        );
    }
}

fn relative(path: &Path, session: &BuildSession) -> String {
    path.strip_prefix(&session.project_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}
