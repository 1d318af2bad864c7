//! Compile and link invocations.
//!
//! The executor turns units into argument vectors and runs them through a
//! [`ProcessRunner`]. Tool paths and flags are injected at construction so
//! builds stay reproducible under a different toolchain and tests can swap
//! the runner.

use super::process::ProcessRunner;
use super::unit::{Unit, UnitId};
use super::utils::render_command;
use crate::cache::{Artifact, ArtifactKind, Fingerprint};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("compiling {} failed ({})", .file.display(), describe_exit(.exit_code))]
pub struct CompileError {
    pub file: PathBuf,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("linking {} failed ({})", .output.display(), describe_exit(.exit_code))]
pub struct LinkError {
    pub output: PathBuf,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "did not run to completion".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compiler: PathBuf,
    pub linker: PathBuf,
}

impl Toolchain {
    pub fn clang() -> Self {
        Self {
            compiler: PathBuf::from("clang++"),
            linker: PathBuf::from("clang++"),
        }
    }
}

/// Paths under the build directory of one profile.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    dir: PathBuf,
}

impl BuildLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Prebuilt module search path; holds every interface artifact.
    pub fn module_dir(&self) -> PathBuf {
        self.dir.join("pcm")
    }

    pub fn object_dir(&self) -> PathBuf {
        self.dir.join("obj")
    }

    /// `app:net` is stored as `app-net.pcm`, the name clang looks up.
    pub fn interface_path(&self, module: &str) -> PathBuf {
        self.module_dir()
            .join(format!("{}.pcm", module.replace(':', "-")))
    }

    /// Mirrors the source tree under `obj/` and keeps the extension, so
    /// `src/a/b.cpp`, `src/a_b.cpp` and `src/a/b.cc` get distinct objects.
    /// Sources outside the project land under `obj/_external/`.
    pub fn object_path(&self, source: &Path, project_dir: &Path) -> PathBuf {
        let (mut object, relative) = match source.strip_prefix(project_dir) {
            Ok(relative) => (self.object_dir(), relative),
            Err(_) => (self.object_dir().join("_external"), source),
        };
        for component in relative.components() {
            match component {
                Component::Normal(part) => object.push(part),
                Component::ParentDir => object.push("_up"),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        let mut name = object.into_os_string();
        name.push(".o");
        PathBuf::from(name)
    }

    pub fn executable_path(&self, name: &str) -> PathBuf {
        if cfg!(target_os = "windows") {
            self.dir.join(format!("{}.exe", name))
        } else {
            self.dir.join(name)
        }
    }

    pub fn compile_commands_path(&self) -> PathBuf {
        self.dir.join("compile_commands.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(".buildr-fingerprints.json")
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.module_dir())?;
        fs::create_dir_all(self.object_dir())
    }
}

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }

    pub fn command_line(&self) -> String {
        render_command(&self.argv())
    }
}

#[derive(Debug, Clone)]
pub struct CompileJob {
    pub unit: UnitId,
    pub source: PathBuf,
    pub invocation: Invocation,
    pub artifact: Artifact,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone)]
pub struct LinkJob {
    pub inputs: Vec<Artifact>,
    pub invocation: Invocation,
    pub artifact: Artifact,
    pub fingerprint: Fingerprint,
}

/// Artifact plus whatever the tool printed on stderr while succeeding.
#[derive(Debug, Clone)]
pub struct Finished {
    pub artifact: Artifact,
    pub warnings: String,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub toolchain: Toolchain,
    pub layout: BuildLayout,
    pub project_dir: PathBuf,
    /// Fully resolved: standard, profile, project and dependency flags.
    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
    pub output_name: String,
}

pub struct Executor {
    config: ExecutorConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.config.layout
    }

    pub fn project_dir(&self) -> &Path {
        &self.config.project_dir
    }

    pub fn artifact_for(&self, unit: &Unit) -> Artifact {
        match (&unit.exports, unit.kind.is_module()) {
            (Some(module), true) => Artifact::new(
                self.config.layout.interface_path(module),
                ArtifactKind::ModuleInterface,
            ),
            _ => Artifact::new(
                self.config
                    .layout
                    .object_path(&unit.path, &self.config.project_dir),
                ArtifactKind::Object,
            ),
        }
    }

    pub fn compile_invocation(&self, unit: &Unit) -> Invocation {
        let artifact = self.artifact_for(unit);
        let mut args = self.config.compile_args.clone();
        args.push(format!(
            "-fprebuilt-module-path={}",
            self.config.layout.module_dir().display()
        ));
        if unit.kind.is_module() {
            args.push("--precompile".to_string());
        } else {
            args.push("-c".to_string());
        }
        args.push("-o".to_string());
        args.push(artifact.path.to_string_lossy().into_owned());
        args.push(unit.path.to_string_lossy().into_owned());

        Invocation {
            program: self.config.toolchain.compiler.clone(),
            args,
        }
    }

    pub fn executable(&self) -> Artifact {
        Artifact::new(
            self.config.layout.executable_path(&self.config.output_name),
            ArtifactKind::Executable,
        )
    }

    /// `inputs` are linked in the order given (source-list order).
    pub fn link_invocation(&self, inputs: &[Artifact]) -> Invocation {
        let mut args = vec![format!(
            "-fprebuilt-module-path={}",
            self.config.layout.module_dir().display()
        )];
        args.extend(
            inputs
                .iter()
                .map(|a| a.path.to_string_lossy().into_owned()),
        );
        args.extend(self.config.link_args.iter().cloned());
        args.push("-o".to_string());
        args.push(self.executable().path.to_string_lossy().into_owned());

        Invocation {
            program: self.config.toolchain.linker.clone(),
            args,
        }
    }

    pub fn run_compile(&self, job: &CompileJob) -> Result<Finished, CompileError> {
        let warnings =
            self.invoke(&job.invocation, &job.artifact)
                .map_err(|failure| CompileError {
                    file: job.source.clone(),
                    exit_code: failure.exit_code,
                    stderr: failure.stderr,
                })?;
        Ok(Finished {
            artifact: job.artifact.clone(),
            warnings,
        })
    }

    pub fn run_link(&self, job: &LinkJob) -> Result<Finished, LinkError> {
        let warnings =
            self.invoke(&job.invocation, &job.artifact)
                .map_err(|failure| LinkError {
                    output: job.artifact.path.clone(),
                    exit_code: failure.exit_code,
                    stderr: failure.stderr,
                })?;
        Ok(Finished {
            artifact: job.artifact.clone(),
            warnings,
        })
    }

    /// Run one tool invocation; on success returns its stderr.
    fn invoke(&self, invocation: &Invocation, artifact: &Artifact) -> Result<String, ToolFailure> {
        if let Some(parent) = artifact.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ToolFailure {
                exit_code: None,
                stderr: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        let output = self
            .runner
            .spawn(&invocation.program, &invocation.args)
            .map_err(|e| ToolFailure {
                exit_code: None,
                stderr: format!("failed to run {}: {}", invocation.program.display(), e),
            })?;

        if !output.success() {
            return Err(ToolFailure {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        // Importers resolve interfaces from disk, so a missing output is fatal.
        if !artifact.exists() {
            return Err(ToolFailure {
                exit_code: output.exit_code,
                stderr: format!(
                    "{} exited successfully but did not produce {}",
                    invocation.program.display(),
                    artifact.path.display()
                ),
            });
        }
        Ok(output.stderr)
    }
}

struct ToolFailure {
    exit_code: Option<i32>,
    stderr: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::process::ProcessOutput;
    use crate::build::unit::UnitKind;
    use std::io;
    use std::sync::Mutex;

    /// Writes the `-o` target unless told to fail.
    struct ScriptedRunner {
        exit_code: i32,
        stderr: &'static str,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ProcessRunner for ScriptedRunner {
        fn spawn(&self, _program: &Path, args: &[String]) -> io::Result<ProcessOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            if self.exit_code == 0 {
                let out = args.iter().position(|a| a == "-o").unwrap() + 1;
                fs::write(&args[out], b"artifact")?;
            }
            Ok(ProcessOutput {
                exit_code: Some(self.exit_code),
                stdout: String::new(),
                stderr: self.stderr.to_string(),
            })
        }
    }

    fn executor(dir: &Path, exit_code: i32, stderr: &'static str) -> Executor {
        Executor::new(
            ExecutorConfig {
                toolchain: Toolchain::clang(),
                layout: BuildLayout::new(dir.join("build")),
                project_dir: dir.to_path_buf(),
                compile_args: vec!["-std=c++23".into(), "-g".into()],
                link_args: vec!["-lpthread".into()],
                output_name: "app".into(),
            },
            Arc::new(ScriptedRunner {
                exit_code,
                stderr,
                calls: Mutex::new(Vec::new()),
            }),
        )
    }

    fn interface(dir: &Path, module: &str) -> Unit {
        let mut unit = Unit::plain(dir.join("src").join("m.cppm"), "d");
        unit.kind = if module.contains(':') {
            UnitKind::ModulePartitionUnit
        } else {
            UnitKind::ModuleInterfaceUnit
        };
        unit.exports = Some(module.to_string());
        unit
    }

    fn job_for(exec: &Executor, unit: &Unit) -> CompileJob {
        CompileJob {
            unit: 0,
            source: unit.path.clone(),
            invocation: exec.compile_invocation(unit),
            artifact: exec.artifact_for(unit),
            fingerprint: Fingerprint::compute("d", &[], &[]),
        }
    }

    #[test]
    fn test_plain_unit_arguments() {
        let dir = Path::new("/project");
        let exec = executor(dir, 0, "");
        let unit = Unit::plain("/project/src/net/main.cpp", "d");
        let inv = exec.compile_invocation(&unit);

        assert_eq!(inv.program, PathBuf::from("clang++"));
        assert_eq!(
            inv.args,
            vec![
                "-std=c++23",
                "-g",
                "-fprebuilt-module-path=/project/build/pcm",
                "-c",
                "-o",
                "/project/build/obj/src/net/main.cpp.o",
                "/project/src/net/main.cpp",
            ]
        );
    }

    #[test]
    fn test_module_units_are_precompiled_into_pcm() {
        let dir = Path::new("/project");
        let exec = executor(dir, 0, "");
        let unit = interface(dir, "app:net");
        let inv = exec.compile_invocation(&unit);

        assert!(inv.args.contains(&"--precompile".to_string()));
        assert!(!inv.args.contains(&"-c".to_string()));
        assert_eq!(
            exec.artifact_for(&unit),
            Artifact::new("/project/build/pcm/app-net.pcm", ArtifactKind::ModuleInterface)
        );
    }

    #[test]
    fn test_link_invocation_orders_inputs_then_link_args() {
        let exec = executor(Path::new("/project"), 0, "");
        let inputs = vec![
            Artifact::new("/project/build/pcm/m.pcm", ArtifactKind::ModuleInterface),
            Artifact::new("/project/build/obj/src/main.cpp.o", ArtifactKind::Object),
        ];
        let inv = exec.link_invocation(&inputs);
        assert_eq!(
            inv.command_line(),
            "clang++ -fprebuilt-module-path=/project/build/pcm /project/build/pcm/m.pcm \
             /project/build/obj/src/main.cpp.o -lpthread -o /project/build/app"
        );
    }

    #[test]
    fn test_compile_success_returns_artifact_and_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), 0, "warning: unused variable");
        let unit = interface(dir.path(), "m");
        let job = job_for(&exec, &unit);

        let finished = exec.run_compile(&job).unwrap();
        assert!(finished.artifact.exists());
        assert_eq!(finished.warnings, "warning: unused variable");
    }

    #[test]
    fn test_non_zero_exit_is_compile_error_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), 1, "error: expected ';'");
        let unit = interface(dir.path(), "m");
        let job = job_for(&exec, &unit);

        let err = exec.run_compile(&job).unwrap_err();
        assert_eq!(err.exit_code, Some(1));
        assert_eq!(err.stderr, "error: expected ';'");
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_link_failure_is_link_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), 1, "undefined reference to `main'");
        let job = LinkJob {
            inputs: Vec::new(),
            invocation: exec.link_invocation(&[]),
            artifact: exec.executable(),
            fingerprint: Fingerprint::compute("link", &[], &[]),
        };
        let err = exec.run_link(&job).unwrap_err();
        assert!(err.stderr.contains("undefined reference"));
        assert_eq!(err.output, exec.executable().path);
    }

    #[test]
    fn test_object_paths_do_not_collide() {
        let layout = BuildLayout::new("/project/build");
        let project = Path::new("/project");
        let sources = [
            "/project/src/a_b.cpp",
            "/project/src/a/b.cpp",
            "/project/src/util.cc",
            "/project/src/util.cpp",
        ];
        let objects: Vec<_> = sources
            .iter()
            .map(|s| layout.object_path(Path::new(s), project))
            .collect();

        assert_eq!(objects[0], PathBuf::from("/project/build/obj/src/a_b.cpp.o"));
        assert_eq!(objects[1], PathBuf::from("/project/build/obj/src/a/b.cpp.o"));
        let unique: std::collections::HashSet<_> = objects.iter().collect();
        assert_eq!(unique.len(), sources.len());
    }

    #[test]
    fn test_sources_outside_project_stay_under_object_dir() {
        let layout = BuildLayout::new("/project/build");
        let object = layout.object_path(Path::new("/opt/shared/log.cpp"), Path::new("/project"));
        assert_eq!(
            object,
            PathBuf::from("/project/build/obj/_external/opt/shared/log.cpp.o")
        );
    }
}
