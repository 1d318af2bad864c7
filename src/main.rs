//! # buildr CLI Entry Point
//!
//! Parses arguments with clap and routes to the library:
//! `build`, `run`, `graph`, `clean`, `watch`, `completion`.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use buildr::build::{self, BuildOptions};
use buildr::tree;

#[derive(Parser)]
#[command(name = "buildr")]
#[command(about = "A C++ build tool that understands named modules", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory containing buildr.toml
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct BuildArgs {
    /// Build artifacts in release mode, with optimizations
    #[arg(long)]
    release: bool,
    /// Show every compiler command and cache decision
    #[arg(short, long)]
    verbose: bool,
    /// Number of parallel jobs [default: number of CPUs]
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Stop starting new jobs after the first failure
    #[arg(long)]
    fail_fast: bool,
    /// Reject imports of modules no project source exports
    #[arg(long)]
    strict: bool,
}

impl BuildArgs {
    fn options(&self) -> BuildOptions {
        BuildOptions {
            release: self.release,
            verbose: self.verbose,
            jobs: self.jobs,
            fail_fast: self.fail_fast,
            strict: self.strict,
            progress: true,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the current project
    Build(BuildArgs),
    /// Compile and run the output binary
    Run {
        #[command(flatten)]
        build: BuildArgs,
        /// Arguments passed to the target program
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Show units, their module kinds and the import tree
    Graph,
    /// Remove build artifacts and compile_commands.json
    Clean,
    /// Rebuild whenever a source file changes
    Watch(BuildArgs),
    /// Generate shell completions
    Completion { shell: Shell },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match &cli.project {
        Some(dir) => dir
            .canonicalize()
            .with_context(|| format!("Project directory {} not found", dir.display()))?,
        None => std::env::current_dir()?,
    };

    match &cli.command {
        Commands::Build(args) => match build::build_project(&project_dir, &args.options()) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => std::process::exit(1),
            Err(e) => Err(e),
        },
        Commands::Run { build: args, args: run_args } => {
            match build::build_and_run(&project_dir, &args.options(), run_args) {
                Ok(true) => Ok(()),
                Ok(false) => std::process::exit(1),
                Err(e) => Err(e),
            }
        }
        Commands::Graph => tree::print_graph(&project_dir),
        Commands::Clean => build::clean(&project_dir),
        Commands::Watch(args) => build::watch(&project_dir, &args.options()),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}
