//! Build engine: scan sources, order them by module imports, and run the
//! compiler on a bounded worker pool.

mod clean;
mod core;
pub mod executor;
mod feedback;
pub mod graph;
pub mod ledger;
pub mod process;
pub mod scanner;
pub mod scheduler;
pub mod unit;
mod utils;
mod watcher;

pub use clean::clean;
pub use self::core::{
    BuildOptions, BuildSession, SOURCE_EXTENSIONS, build_and_run, build_project,
    build_with_runner, discover_sources, load_graph, print_summary,
};
pub use feedback::FeedbackAnalyzer;
pub use utils::{CONFIG_FILE, load_config, parse_config, render_command};
pub use watcher::watch;
