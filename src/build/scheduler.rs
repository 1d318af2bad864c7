//! Dependency-ordered, bounded-parallel job scheduler.
//!
//! One job per unit plus a terminal link job that depends on all of them.
//! The calling thread owns every piece of readiness state; `W` scoped worker
//! threads pull prepared jobs from a shared channel, run the compiler and
//! report back on a completion channel. Workers never touch the counters.
//!
//! A job becomes ready once every dependency is done. Ready jobs whose
//! fingerprint hits the cache are settled on the spot (skipped) and never
//! occupy a worker. A failure poisons all transitive dependents; with
//! `fail_fast` nothing new is started after it, but in-flight jobs finish.

use super::executor::{CompileError, CompileJob, Executor, Finished, LinkError, LinkJob};
use super::graph::Graph;
use super::ledger::{CommandLedger, LedgerEntry};
use super::unit::UnitId;
use crate::cache::{Artifact, ArtifactCache, Fingerprint};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, mpsc};
use thiserror::Error;

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Maximum concurrently running jobs; values below 1 are treated as 1.
    pub workers: usize,
    /// Stop dispatching after the first failure.
    pub fail_fast: bool,
    /// Echo every command and cache decision.
    pub verbose: bool,
    /// Draw a progress bar and echo compiler warnings.
    pub progress: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fail_fast: false,
            verbose: false,
            progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobId {
    Compile(UnitId),
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    /// Cache hit; satisfies dependents exactly like `Done`.
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Skipped)
    }

    pub fn is_done(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Skipped)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobFailure {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("not run: {} failed", .dependency.display())]
    DependencyFailed { dependency: PathBuf },

    #[error("not run: build stopped after an earlier failure")]
    Cancelled,
}

impl JobFailure {
    /// Tool output for jobs that actually ran.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            JobFailure::Compile(e) => Some(&e.stderr),
            JobFailure::Link(e) => Some(&e.stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: JobId,
    /// Source file for compile jobs, the executable for the link job.
    pub path: PathBuf,
    pub cause: JobFailure,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Final status per unit, indexed by `UnitId`.
    pub statuses: Vec<JobStatus>,
    pub link_status: JobStatus,
    /// In the order failures were discovered.
    pub failures: Vec<FailedJob>,
    pub dispatch_order: Vec<JobId>,
    /// Jobs that ran to success, in completion order.
    pub executed: Vec<JobId>,
    pub skipped: Vec<JobId>,
    pub executable: Option<Artifact>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.link_status.is_done()
    }

    pub fn status(&self, job: JobId) -> JobStatus {
        match job {
            JobId::Compile(id) => self.statuses[id],
            JobId::Link => self.link_status,
        }
    }

    pub fn failure(&self, job: JobId) -> Option<&FailedJob> {
        self.failures.iter().find(|f| f.job == job)
    }

    /// Failures that came from running a tool, not from poisoning.
    pub fn root_failures(&self) -> impl Iterator<Item = &FailedJob> {
        self.failures
            .iter()
            .filter(|f| matches!(f.cause, JobFailure::Compile(_) | JobFailure::Link(_)))
    }

    /// Jobs that never ran because `path` failed.
    pub fn poisoned_by(&self, path: &Path) -> Vec<&FailedJob> {
        self.failures
            .iter()
            .filter(|f| {
                matches!(&f.cause, JobFailure::DependencyFailed { dependency } if dependency == path)
            })
            .collect()
    }
}

enum Work {
    Compile(CompileJob),
    Link(LinkJob),
}

enum Outcome {
    Compiled {
        job: CompileJob,
        result: Result<Finished, CompileError>,
    },
    Linked {
        job: LinkJob,
        result: Result<Finished, LinkError>,
    },
}

/// Readiness bookkeeping. Index `units.len()` is the link job.
struct State {
    status: Vec<JobStatus>,
    waiting_on: Vec<usize>,
    fingerprints: Vec<Option<Fingerprint>>,
    artifacts: Vec<Option<Artifact>>,
    ready: VecDeque<Work>,
    in_flight: usize,
    halted: bool,
    failures: Vec<FailedJob>,
    dispatch_order: Vec<JobId>,
    executed: Vec<JobId>,
    skipped: Vec<JobId>,
    executable: Option<Artifact>,
}

impl State {
    fn new(graph: &Graph) -> Self {
        let n = graph.len();
        let mut waiting_on: Vec<usize> = (0..n).map(|id| graph.dependencies(id).len()).collect();
        waiting_on.push(n);
        Self {
            status: vec![JobStatus::Pending; n + 1],
            waiting_on,
            fingerprints: vec![None; n + 1],
            artifacts: vec![None; n + 1],
            ready: VecDeque::new(),
            in_flight: 0,
            halted: false,
            failures: Vec::new(),
            dispatch_order: Vec::new(),
            executed: Vec::new(),
            skipped: Vec::new(),
            executable: None,
        }
    }

    fn link_index(&self) -> usize {
        self.status.len() - 1
    }

    fn job_id(&self, idx: usize) -> JobId {
        if idx == self.link_index() {
            JobId::Link
        } else {
            JobId::Compile(idx)
        }
    }

    fn into_report(mut self) -> BuildReport {
        let link_status = self.status.pop().unwrap_or(JobStatus::Failed);
        BuildReport {
            statuses: self.status,
            link_status,
            failures: self.failures,
            dispatch_order: self.dispatch_order,
            executed: self.executed,
            skipped: self.skipped,
            executable: self.executable,
        }
    }
}

pub struct Scheduler<'a> {
    graph: &'a Graph,
    executor: &'a Executor,
    cache: &'a ArtifactCache,
    ledger: &'a CommandLedger,
    options: ScheduleOptions,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        graph: &'a Graph,
        executor: &'a Executor,
        cache: &'a ArtifactCache,
        ledger: &'a CommandLedger,
        options: ScheduleOptions,
    ) -> Self {
        Self {
            graph,
            executor,
            cache,
            ledger,
            options,
        }
    }

    /// Drive every job to a terminal state.
    pub fn run(&self) -> BuildReport {
        let workers = self.options.workers.max(1);
        let progress = self.progress_bar(self.graph.len() as u64 + 1);
        let mut state = State::new(self.graph);

        let (work_tx, work_rx) = mpsc::channel::<Work>();
        let (done_tx, done_rx) = mpsc::channel::<Outcome>();
        let work_rx = Mutex::new(work_rx);
        let executor = self.executor;

        std::thread::scope(|s| {
            for _ in 0..workers {
                let done_tx = done_tx.clone();
                let work_rx = &work_rx;
                s.spawn(move || worker_loop(executor, work_rx, done_tx));
            }
            // Workers hold the only senders now; recv fails if they all exit.
            drop(done_tx);

            let initial: Vec<usize> = (0..state.status.len())
                .filter(|&idx| state.waiting_on[idx] == 0)
                .collect();
            self.promote(&mut state, initial, &progress);

            loop {
                self.dispatch(&mut state, &work_tx, workers, &progress);
                if state.in_flight == 0 {
                    break;
                }
                match done_rx.recv() {
                    Ok(outcome) => {
                        state.in_flight -= 1;
                        self.complete(&mut state, outcome, &progress);
                    }
                    Err(_) => break,
                }
            }

            drop(work_tx);
        });

        progress.finish_and_clear();
        debug_assert!(state.status.iter().all(|s| s.is_terminal()));
        state.into_report()
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Compiling...");
        pb
    }

    fn say(&self, progress: &ProgressBar, line: String) {
        if !self.options.progress {
            return;
        }
        if progress.is_hidden() {
            println!("{}", line);
        } else {
            progress.println(line);
        }
    }

    /// Move newly unblocked jobs to Ready, settling cache hits immediately.
    /// Candidates are handled in order, and jobs unblocked by a cache hit
    /// queue up behind them.
    fn promote(&self, state: &mut State, candidates: Vec<usize>, progress: &ProgressBar) {
        let mut queue: VecDeque<usize> = candidates.into();
        while let Some(idx) = queue.pop_front() {
            if state.halted || state.status[idx] != JobStatus::Pending {
                continue;
            }
            state.status[idx] = JobStatus::Ready;
            let work = self.prepare(state, idx);

            match self.cache_hit(state, &work) {
                Some(artifact) => {
                    self.settle_skipped(state, idx, &work, artifact, progress);
                    queue.extend(self.release(state, idx));
                }
                None => state.ready.push_back(work),
            }
        }
    }

    fn prepare(&self, state: &State, idx: usize) -> Work {
        if idx == state.link_index() {
            let inputs: Vec<Artifact> = state.artifacts[..idx].iter().flatten().cloned().collect();
            let invocation = self.executor.link_invocation(&inputs);
            let deps: Vec<&Fingerprint> = state.fingerprints[..idx].iter().flatten().collect();
            let fingerprint = Fingerprint::compute("link", &invocation.argv(), &deps);
            return Work::Link(LinkJob {
                inputs,
                invocation,
                artifact: self.executor.executable(),
                fingerprint,
            });
        }

        let unit = self.graph.unit(idx);
        let invocation = self.executor.compile_invocation(unit);
        let deps: Vec<&Fingerprint> = self
            .graph
            .dependencies(idx)
            .iter()
            .filter_map(|&dep| state.fingerprints[dep].as_ref())
            .collect();
        let fingerprint = Fingerprint::compute(&unit.digest, &invocation.argv(), &deps);
        Work::Compile(CompileJob {
            unit: idx,
            source: unit.path.clone(),
            invocation,
            artifact: self.executor.artifact_for(unit),
            fingerprint,
        })
    }

    /// A hit counts only if the cached file and every input artifact exist.
    fn cache_hit(&self, state: &State, work: &Work) -> Option<Artifact> {
        let (fingerprint, expected, inputs): (&Fingerprint, &Artifact, Vec<&Artifact>) = match work {
            Work::Compile(job) => (
                &job.fingerprint,
                &job.artifact,
                self.graph
                    .dependencies(job.unit)
                    .iter()
                    .filter_map(|&dep| state.artifacts[dep].as_ref())
                    .collect(),
            ),
            Work::Link(job) => (&job.fingerprint, &job.artifact, job.inputs.iter().collect()),
        };

        let hit = self.cache.lookup(fingerprint)?;
        if hit.path != expected.path || inputs.iter().any(|a| !a.exists()) {
            return None;
        }
        Some(hit)
    }

    fn settle_skipped(
        &self,
        state: &mut State,
        idx: usize,
        work: &Work,
        artifact: Artifact,
        progress: &ProgressBar,
    ) {
        let (file, invocation, fingerprint) = match work {
            Work::Compile(job) => (&job.source, &job.invocation, &job.fingerprint),
            Work::Link(job) => (&job.artifact.path, &job.invocation, &job.fingerprint),
        };
        if self.options.verbose {
            self.say(
                progress,
                format!(
                    "   {} {} (cached {})",
                    "⚡".green(),
                    file.display(),
                    fingerprint.short()
                ),
            );
        }
        self.ledger.record(LedgerEntry {
            directory: self.executor.project_dir().to_path_buf(),
            command: invocation.command_line(),
            file: file.clone(),
            output: artifact.path.clone(),
            skipped: true,
        });

        let job = state.job_id(idx);
        state.status[idx] = JobStatus::Skipped;
        state.fingerprints[idx] = Some(fingerprint.clone());
        if job == JobId::Link {
            state.executable = Some(artifact.clone());
        }
        state.artifacts[idx] = Some(artifact);
        state.skipped.push(job);
        progress.inc(1);
    }

    /// Decrement the waiting count of every direct dependent and return the
    /// ones that just reached zero, in source-list order (link last).
    fn release(&self, state: &mut State, idx: usize) -> Vec<usize> {
        let link = state.link_index();
        if idx == link {
            return Vec::new();
        }
        let mut unblocked = Vec::new();
        for &dependent in self.graph.dependents(idx).iter().chain(std::iter::once(&link)) {
            state.waiting_on[dependent] -= 1;
            if state.waiting_on[dependent] == 0 {
                unblocked.push(dependent);
            }
        }
        unblocked
    }

    fn dispatch(
        &self,
        state: &mut State,
        work_tx: &mpsc::Sender<Work>,
        workers: usize,
        progress: &ProgressBar,
    ) {
        while state.in_flight < workers && !state.halted {
            let Some(work) = state.ready.pop_front() else {
                break;
            };
            let (idx, file, command) = match &work {
                Work::Compile(job) => (job.unit, job.source.clone(), job.invocation.command_line()),
                Work::Link(job) => (
                    state.link_index(),
                    job.artifact.path.clone(),
                    job.invocation.command_line(),
                ),
            };

            let output = match &work {
                Work::Compile(job) => &job.artifact.path,
                Work::Link(job) => &job.artifact.path,
            };
            self.cache.evict_path(output);

            let job = state.job_id(idx);
            state.status[idx] = JobStatus::Running;
            state.dispatch_order.push(job);
            state.in_flight += 1;

            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if idx == state.link_index() {
                progress.set_message(format!("Linking {}", name));
            } else {
                progress.set_message(format!("Compiling {}", name));
            }
            if self.options.verbose {
                self.say(progress, format!("   {} {}", "$".dimmed(), command));
            }

            if let Err(mpsc::SendError(work)) = work_tx.send(work) {
                state.in_flight -= 1;
                let cause = match work {
                    Work::Compile(job) => JobFailure::Compile(CompileError {
                        file: job.source,
                        exit_code: None,
                        stderr: "worker pool shut down".to_string(),
                    }),
                    Work::Link(job) => JobFailure::Link(LinkError {
                        output: job.artifact.path,
                        exit_code: None,
                        stderr: "worker pool shut down".to_string(),
                    }),
                };
                self.fail(state, idx, cause, progress);
            }
        }
    }

    fn complete(&self, state: &mut State, outcome: Outcome, progress: &ProgressBar) {
        let (idx, file, work_result) = match outcome {
            Outcome::Compiled { job, result } => {
                self.record_run(&job.source, &job.invocation.command_line(), &job.artifact);
                let idx = job.unit;
                let result = result
                    .map(|finished| (finished, job.fingerprint))
                    .map_err(JobFailure::Compile);
                (idx, job.source, result)
            }
            Outcome::Linked { job, result } => {
                self.record_run(
                    &job.artifact.path,
                    &job.invocation.command_line(),
                    &job.artifact,
                );
                let result = result
                    .map(|finished| (finished, job.fingerprint))
                    .map_err(JobFailure::Link);
                (state.link_index(), job.artifact.path, result)
            }
        };

        match work_result {
            Ok((finished, fingerprint)) => {
                if !finished.warnings.trim().is_empty() {
                    self.say(
                        progress,
                        format!(
                            "{} Warning in {}:\n{}",
                            "!".yellow(),
                            file.display(),
                            finished.warnings.trim_end()
                        ),
                    );
                }
                self.cache.store(fingerprint.clone(), finished.artifact.clone());

                let job = state.job_id(idx);
                state.status[idx] = JobStatus::Done;
                state.fingerprints[idx] = Some(fingerprint);
                if job == JobId::Link {
                    state.executable = Some(finished.artifact.clone());
                }
                state.artifacts[idx] = Some(finished.artifact);
                state.executed.push(job);
                progress.inc(1);

                let unblocked = self.release(state, idx);
                self.promote(state, unblocked, progress);
            }
            Err(cause) => self.fail(state, idx, cause, progress),
        }
    }

    fn record_run(&self, file: &Path, command: &str, artifact: &Artifact) {
        self.ledger.record(LedgerEntry {
            directory: self.executor.project_dir().to_path_buf(),
            command: command.to_string(),
            file: file.to_path_buf(),
            output: artifact.path.clone(),
            skipped: false,
        });
    }

    /// Mark `idx` failed, poison its transitive dependents, and under
    /// fail-fast cancel everything that has not started.
    fn fail(&self, state: &mut State, idx: usize, cause: JobFailure, progress: &ProgressBar) {
        let link = state.link_index();
        let path = self.job_path(state, idx);
        self.say(progress, format!("{} {}", "x".red(), cause));
        self.mark_failed(state, idx, cause, progress);

        if idx != link {
            let mut poisoned = self.graph.transitive_dependents(idx);
            poisoned.push(link);
            for dependent in poisoned {
                if state.status[dependent].is_terminal() {
                    continue;
                }
                self.mark_failed(
                    state,
                    dependent,
                    JobFailure::DependencyFailed {
                        dependency: path.clone(),
                    },
                    progress,
                );
            }
        }

        if self.options.fail_fast && !state.halted {
            state.halted = true;
            state.ready.clear();
            for other in 0..state.status.len() {
                if matches!(state.status[other], JobStatus::Pending | JobStatus::Ready) {
                    self.mark_failed(state, other, JobFailure::Cancelled, progress);
                }
            }
        }
    }

    fn mark_failed(&self, state: &mut State, idx: usize, cause: JobFailure, progress: &ProgressBar) {
        let job = state.job_id(idx);
        let path = self.job_path(state, idx);
        state.status[idx] = JobStatus::Failed;
        state.failures.push(FailedJob { job, path, cause });
        progress.inc(1);
    }

    fn job_path(&self, state: &State, idx: usize) -> PathBuf {
        if idx == state.link_index() {
            self.executor.executable().path
        } else {
            self.graph.unit(idx).path.clone()
        }
    }
}

fn worker_loop(
    executor: &Executor,
    work_rx: &Mutex<mpsc::Receiver<Work>>,
    done_tx: mpsc::Sender<Outcome>,
) {
    loop {
        let next = work_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(work) = next else {
            break;
        };
        let outcome = match work {
            Work::Compile(job) => {
                let result = executor.run_compile(&job);
                Outcome::Compiled { job, result }
            }
            Work::Link(job) => {
                let result = executor.run_link(&job);
                Outcome::Linked { job, result }
            }
        };
        if done_tx.send(outcome).is_err() {
            break;
        }
    }
}
