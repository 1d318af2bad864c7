use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external tools. Arguments are passed through verbatim, never via a
/// shell. Implementations must be shareable across worker threads.
pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, program: &Path, args: &[String]) -> io::Result<ProcessOutput>;
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    working_dir: PathBuf,
}

impl SystemRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn spawn(&self, program: &Path, args: &[String]) -> io::Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .output()?;
        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
