//! The case runner: compile, run, and compare one fixture.
//!
//! Each case moves through a small state machine and stops at the first terminal state:
//!
//! ```text
//! Start -> Compiling -> COMPILE_FAILED | Compiled
//! Compiled -> Running -> RUNTIME_FAILED | TIMED_OUT | Ran
//! Ran -> Comparing -> PASSED | OUTPUT_MISMATCH
//! ```
//!
//! Every case gets a private scratch directory, so concurrently compiled artifacts
//! never collide. The directory is removed when the case finishes unless the run keeps
//! artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, info, trace};

use crate::cancel::CancelSignal;
use crate::config::RunConfig;
use crate::diagnostics::DriverError;
use crate::fixture::Expectation;
use crate::process::{ProcessDriver, ProcessOutput, ProcessRequest};

pub mod compare;
pub mod invocation;
pub mod outcome;

pub use compare::{compare_lines, split_output, Extra, Mismatch};
pub use invocation::{Invocation, Placeholders, Stage};
pub use outcome::{Outcome, Phase, Status};

/// Stderr lines kept on a failed outcome.
pub const STDERR_TAIL_LINES: usize = 5;

/// Executes single cases through a [`ProcessDriver`].
pub struct CaseRunner<D> {
    driver: D,
    config: Arc<RunConfig>,
}

impl<D: ProcessDriver> CaseRunner<D> {
    pub fn new(driver: D, config: Arc<RunConfig>) -> Self {
        Self { driver, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs one case to a terminal state. Never fails: every problem becomes a status.
    pub async fn run(&self, case: Arc<Expectation>, cancel: &CancelSignal) -> Outcome {
        let started = Instant::now();
        let outcome = match self.execute(&case, cancel).await {
            Ok(outcome) | Err(outcome) => outcome,
        };
        let outcome = outcome.with_elapsed(started.elapsed());
        debug!(case = %outcome.id(), status = %outcome.status, elapsed = ?outcome.elapsed, "case finished");
        outcome
    }

    /// `Err` carries an early terminal outcome so each phase can bail out with `?`.
    async fn execute(
        &self,
        case: &Arc<Expectation>,
        cancel: &CancelSignal,
    ) -> Result<Outcome, Outcome> {
        let workspace = Workspace::create(case, self.config.keep_artifacts)?;
        let placeholders = workspace.placeholders.clone();

        let program = match case.compiler_spec() {
            Some(spec) => {
                let spec = if spec.trim().is_empty() {
                    self.config.default_compiler.as_str()
                } else {
                    spec
                };
                self.compile(case, spec, &placeholders, cancel).await?;
                placeholders.artifact.clone()
            }
            None => placeholders.source.clone(),
        };

        let output = self.execute_program(case, &program, &placeholders, cancel).await?;
        let actual = split_output(&output.stdout);
        let outcome = match compare_lines(case.expected_lines(), &actual) {
            None => Outcome::new(case.clone(), Status::Passed, Phase::Compare, ""),
            Some(mismatch) => Outcome::new(
                case.clone(),
                Status::OutputMismatch,
                Phase::Compare,
                format!("compare: {mismatch}"),
            )
            .with_mismatch(mismatch),
        };
        let tail = output.stderr_tail(STDERR_TAIL_LINES);
        Ok(outcome.with_actual_lines(actual).with_exit(output.exit, tail))
    }

    async fn compile(
        &self,
        case: &Arc<Expectation>,
        spec: &str,
        placeholders: &Placeholders,
        cancel: &CancelSignal,
    ) -> Result<(), Outcome> {
        let invocation = Invocation::from_spec(
            spec,
            Stage::Compile,
            &self.config.commands,
            placeholders,
            &placeholders.source,
        )
        .map_err(|err| Outcome::internal(case.clone(), Phase::Compile, format!("compile: {err}")))?;

        let request = self.request(invocation, &placeholders.workdir, None);
        let output = self.invoke(case, Phase::Compile, &request, cancel).await?;
        if output.exit.is_success() {
            trace!(case = %case.id(), artifact = %placeholders.artifact.display(), "compiled");
            return Ok(());
        }
        Err(exit_failure(case, Status::CompileFailed, Phase::Compile, &request, &output))
    }

    async fn execute_program(
        &self,
        case: &Arc<Expectation>,
        program: &Path,
        placeholders: &Placeholders,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutput, Outcome> {
        let invocation = match case.runtime_spec().map(str::trim) {
            Some(spec) if !spec.is_empty() => Invocation::from_spec(
                spec,
                Stage::Run,
                &self.config.commands,
                placeholders,
                program,
            )
            .map_err(|err| Outcome::internal(case.clone(), Phase::Run, format!("run: {err}")))?,
            _ => Invocation::direct(program),
        };

        let request = self.request(invocation, &placeholders.workdir, case.stdin_bytes());
        let output = self.invoke(case, Phase::Run, &request, cancel).await?;
        if output.exit.is_success() {
            return Ok(output);
        }
        Err(exit_failure(case, Status::RuntimeFailed, Phase::Run, &request, &output))
    }

    fn request(&self, invocation: Invocation, workdir: &Path, stdin: Option<Vec<u8>>) -> ProcessRequest {
        ProcessRequest::new(invocation.program, invocation.args, workdir, self.config.timeout)
            .with_stdin(stdin)
    }

    /// Runs one process and maps driver errors onto terminal outcomes.
    async fn invoke(
        &self,
        case: &Arc<Expectation>,
        phase: Phase,
        request: &ProcessRequest,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutput, Outcome> {
        let label = phase.as_str();
        self.driver.run(request, cancel).await.map_err(|err| match err {
            DriverError::Timeout { .. } => {
                Outcome::new(case.clone(), Status::Timeout, phase, format!("{label}: {err}"))
            }
            DriverError::Cancelled { .. } => {
                Outcome::internal(case.clone(), phase, format!("{label}: aborted"))
            }
            DriverError::Spawn { .. } | DriverError::Io { .. } => {
                Outcome::internal(case.clone(), phase, format!("{label}: {err}"))
            }
        })
    }
}

/// Builds the outcome for a process that ran but exited unsuccessfully.
fn exit_failure(
    case: &Arc<Expectation>,
    status: Status,
    phase: Phase,
    request: &ProcessRequest,
    output: &ProcessOutput,
) -> Outcome {
    let tail = output.stderr_tail(STDERR_TAIL_LINES);
    let mut diagnostic = format!(
        "{}: `{}` failed with {}",
        phase.as_str(),
        request.command_line(),
        output.exit
    );
    if let Some(last) = tail.last() {
        diagnostic.push_str(": ");
        diagnostic.push_str(last.trim());
    }
    Outcome::new(case.clone(), status, phase, diagnostic)
        .with_actual_lines(split_output(&output.stdout))
        .with_exit(output.exit, tail)
}

/// A case's scratch directory, removed on drop unless persisted.
struct Workspace {
    _dir: Option<TempDir>,
    placeholders: Placeholders,
}

impl Workspace {
    fn create(case: &Arc<Expectation>, keep: bool) -> Result<Self, Outcome> {
        let setup_failure =
            |what: &str, err: std::io::Error| Outcome::internal(case.clone(), Phase::Setup, format!("setup: {what}: {err}"));

        let source = case
            .source_path()
            .canonicalize()
            .map_err(|err| setup_failure("cannot resolve source", err))?;
        let dir = tempfile::Builder::new()
            .prefix("goldrun-")
            .tempdir()
            .map_err(|err| setup_failure("cannot create workspace", err))?;

        let (dir, workdir) = if keep {
            let path: PathBuf = dir.keep();
            info!(case = %case.id(), workdir = %path.display(), "keeping artifacts");
            (None, path)
        } else {
            let path = dir.path().to_path_buf();
            (Some(dir), path)
        };

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "case".to_string());
        let placeholders = Placeholders {
            artifact: workdir.join(&stem),
            source,
            workdir,
            stem,
        };
        Ok(Self {
            _dir: dir,
            placeholders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExitSummary;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers each invocation from a queue and records what it was asked to run.
    struct Scripted {
        replies: Mutex<Vec<Result<ProcessOutput, DriverError>>>,
        seen: Mutex<Vec<ProcessRequest>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<ProcessOutput, DriverError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<ProcessRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessDriver for Scripted {
        async fn run(
            &self,
            request: &ProcessRequest,
            _cancel: &CancelSignal,
        ) -> Result<ProcessOutput, DriverError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .expect("unexpected extra invocation")
        }
    }

    fn exited(code: i32, stdout: &str, stderr: &str) -> Result<ProcessOutput, DriverError> {
        Ok(ProcessOutput {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            exit: ExitSummary::Code(code),
            elapsed: Duration::from_millis(1),
        })
    }

    fn fixture(dir: &TempDir, compiler: Option<&str>, runtime: Option<&str>, lines: &[&str]) -> Arc<Expectation> {
        let path = dir.path().join("division.c");
        std::fs::write(&path, "int main(void) { return 0; }\n").unwrap();
        Arc::new(Expectation::new(
            path,
            compiler.map(str::to_string),
            runtime.map(str::to_string),
            lines.iter().map(|s| s.to_string()).collect(),
        ))
    }

    const DIVISION: [&str; 3] = [
        "int args: -1, 0, 1",
        "double args: 1.500000, 0.800000",
        "float args: 4.000000, 2.000000",
    ];

    fn runner(driver: Scripted) -> CaseRunner<Arc<Scripted>> {
        CaseRunner::new(Arc::new(driver), Arc::new(RunConfig::default()))
    }

    #[tokio::test]
    async fn exact_output_passes() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, Some(""), Some(""), &DIVISION);
        let driver = Arc::new(Scripted::new(vec![
            exited(0, "", ""),
            exited(0, &format!("{}\n", DIVISION.join("\n")), ""),
        ]));
        let runner = CaseRunner::new(driver.clone(), Arc::new(RunConfig::default()));

        let outcome = runner.run(case, &CancelSignal::never()).await;
        assert_eq!(outcome.status, Status::Passed, "{}", outcome.diagnostic);
        assert_eq!(outcome.actual_lines, DIVISION);

        let seen = driver.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].program, "cc");
        assert_eq!(seen[0].args[1], "-o");
        // The compiled artifact is what gets run.
        assert_eq!(seen[1].program, seen[0].args[2]);
        assert!(seen[1].program.ends_with("division"));
    }

    #[tokio::test]
    async fn absent_compiler_runs_source_directly() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, None, None, &["hi"]);
        let driver = Arc::new(Scripted::new(vec![exited(0, "hi\n", "")]));
        let runner = CaseRunner::new(driver.clone(), Arc::new(RunConfig::default()));

        let outcome = runner.run(case, &CancelSignal::never()).await;
        assert_eq!(outcome.status, Status::Passed);
        let seen = driver.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].program.ends_with("division.c"));
    }

    #[tokio::test]
    async fn runtime_spec_receives_program_path() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, None, Some("python3 -u"), &["hi"]);
        let driver = Arc::new(Scripted::new(vec![exited(0, "hi\n", "")]));
        let runner = CaseRunner::new(driver.clone(), Arc::new(RunConfig::default()));

        runner.run(case, &CancelSignal::never()).await;
        let seen = driver.seen();
        assert_eq!(seen[0].program, "python3");
        assert_eq!(seen[0].args[0], "-u");
        assert!(seen[0].args[1].ends_with("division.c"));
    }

    #[tokio::test]
    async fn mismatch_cites_first_divergent_line() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, None, None, &DIVISION);
        let printed = "int args: -1, 0, 1\ndouble args: 1.5, 0.8\nfloat args: 4.000000, 2.000000\n";
        let outcome = runner(Scripted::new(vec![exited(0, printed, "")]))
            .run(case, &CancelSignal::never())
            .await;

        assert_eq!(outcome.status, Status::OutputMismatch);
        assert_eq!(outcome.phase, Phase::Compare);
        let mismatch = outcome.mismatch.as_ref().unwrap();
        assert_eq!(mismatch.line, 2);
        assert_eq!(mismatch.actual.as_deref(), Some("double args: 1.5, 0.8"));
        assert!(outcome.diagnostic.starts_with("compare: line 2: expected"));
        assert_eq!(outcome.actual_lines.len(), 3);
    }

    #[tokio::test]
    async fn compiler_failure_stops_before_running() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, Some(""), None, &["x"]);
        let driver = Arc::new(Scripted::new(vec![exited(1, "", "warning\ndivision.c:1: error: oops\n")]));
        let runner = CaseRunner::new(driver.clone(), Arc::new(RunConfig::default()));

        let outcome = runner.run(case, &CancelSignal::never()).await;
        assert_eq!(outcome.status, Status::CompileFailed);
        assert_eq!(outcome.exit, Some(ExitSummary::Code(1)));
        assert!(outcome.diagnostic.contains("exit code 1"));
        assert!(outcome.diagnostic.ends_with("division.c:1: error: oops"));
        assert_eq!(outcome.stderr_tail, ["warning", "division.c:1: error: oops"]);
        assert_eq!(driver.seen().len(), 1);
    }

    #[tokio::test]
    async fn signalled_program_is_a_runtime_failure() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, None, None, &["x"]);
        let crash = Ok(ProcessOutput {
            stdout: b"x\n".to_vec(),
            stderr: Vec::new(),
            exit: ExitSummary::Signal(11),
            elapsed: Duration::ZERO,
        });
        let outcome = runner(Scripted::new(vec![crash]))
            .run(case, &CancelSignal::never())
            .await;
        assert_eq!(outcome.status, Status::RuntimeFailed);
        assert_eq!(outcome.phase, Phase::Run);
        assert!(outcome.diagnostic.contains("signal 11"));
    }

    #[tokio::test]
    async fn driver_errors_map_to_statuses() {
        let dir = TempDir::new().unwrap();
        let case = fixture(&dir, None, None, &["x"]);

        let timeout = DriverError::Timeout {
            program: "prog".into(),
            after: Duration::from_secs(2),
        };
        let outcome = runner(Scripted::new(vec![Err(timeout)]))
            .run(case.clone(), &CancelSignal::never())
            .await;
        assert_eq!(outcome.status, Status::Timeout);
        assert_eq!(outcome.diagnostic, "run: `prog` timed out after 2s");

        let cancelled = DriverError::Cancelled { program: "prog".into() };
        let outcome = runner(Scripted::new(vec![Err(cancelled)]))
            .run(case.clone(), &CancelSignal::never())
            .await;
        assert_eq!(outcome.status, Status::InternalError);
        assert_eq!(outcome.diagnostic, "run: aborted");

        let spawn = DriverError::Spawn {
            program: "prog".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let outcome = runner(Scripted::new(vec![Err(spawn)]))
            .run(case, &CancelSignal::never())
            .await;
        assert_eq!(outcome.status, Status::InternalError);
        assert!(outcome.diagnostic.starts_with("run: cannot spawn `prog`"));
    }

    #[tokio::test]
    async fn missing_source_is_an_internal_error() {
        let case = Arc::new(Expectation::new("/nonexistent/x.c", None, None, vec![]));
        let outcome = runner(Scripted::new(Vec::new()))
            .run(case, &CancelSignal::never())
            .await;
        assert_eq!(outcome.status, Status::InternalError);
        assert_eq!(outcome.phase, Phase::Setup);
    }

    #[tokio::test]
    async fn declared_stdin_is_forwarded_to_the_run_phase() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echo.sh");
        std::fs::write(&path, "cat\n").unwrap();
        let case = Arc::new(
            Expectation::new(path, None, Some("sh".into()), vec!["7".into()])
                .with_stdin(vec!["7".into()]),
        );
        let driver = Arc::new(Scripted::new(vec![exited(0, "7\n", "")]));
        let runner = CaseRunner::new(driver.clone(), Arc::new(RunConfig::default()));
        runner.run(case, &CancelSignal::never()).await;
        assert_eq!(driver.seen()[0].stdin.as_deref(), Some(&b"7\n"[..]));
    }
}
