use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::compare::Mismatch;
use crate::fixture::Expectation;
use crate::process::ExitSummary;

/// Terminal state of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    OutputMismatch,
    CompileFailed,
    RuntimeFailed,
    Timeout,
    InternalError,
}

impl Status {
    pub fn is_pass(self) -> bool {
        self == Status::Passed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::OutputMismatch => "output mismatch",
            Status::CompileFailed => "compile failed",
            Status::RuntimeFailed => "runtime failed",
            Status::Timeout => "timeout",
            Status::InternalError => "internal error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline phase a case was in when it reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Compile,
    Run,
    Compare,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Compile => "compile",
            Phase::Run => "run",
            Phase::Compare => "compare",
        }
    }
}

/// Result of executing one case against its expectation.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub case: Arc<Expectation>,
    pub status: Status,
    pub phase: Phase,
    pub actual_lines: Vec<String>,
    /// One line, enough to locate and reproduce the failure.
    pub diagnostic: String,
    pub mismatch: Option<Mismatch>,
    pub exit: Option<ExitSummary>,
    pub stderr_tail: Vec<String>,
    pub elapsed: Duration,
}

impl Outcome {
    pub fn new(case: Arc<Expectation>, status: Status, phase: Phase, diagnostic: impl Into<String>) -> Self {
        Self {
            case,
            status,
            phase,
            actual_lines: Vec::new(),
            diagnostic: diagnostic.into(),
            mismatch: None,
            exit: None,
            stderr_tail: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// A harness-side failure that is fatal for this case only.
    pub fn internal(case: Arc<Expectation>, phase: Phase, diagnostic: impl Into<String>) -> Self {
        Self::new(case, Status::InternalError, phase, diagnostic)
    }

    pub fn id(&self) -> String {
        self.case.id()
    }

    pub fn with_exit(mut self, exit: ExitSummary, stderr_tail: Vec<String>) -> Self {
        self.exit = Some(exit);
        self.stderr_tail = stderr_tail;
        self
    }

    pub fn with_actual_lines(mut self, actual_lines: Vec<String>) -> Self {
        self.actual_lines = actual_lines;
        self
    }

    pub fn with_mismatch(mut self, mismatch: Mismatch) -> Self {
        self.mismatch = Some(mismatch);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}
