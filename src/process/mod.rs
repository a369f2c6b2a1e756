//! Running external programs: the compiler and runtime under test.
//!
//! The [`ProcessDriver`] trait is the seam between the case runner and the OS. The
//! production implementation is [`SystemDriver`]; tests substitute scripted drivers.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::cancel::CancelSignal;
use crate::diagnostics::DriverError;

mod system;

pub use system::SystemDriver;

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl ProcessRequest {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    pub fn with_stdin(mut self, stdin: Option<Vec<u8>>) -> Self {
        self.stdin = stdin;
        self
    }

    /// The command line as a user would type it, for diagnostics.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|word| {
                if word.is_empty() || word.contains(char::is_whitespace) {
                    format!("'{word}'")
                } else {
                    word.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitSummary {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl ExitSummary {
    pub fn is_success(self) -> bool {
        self == ExitSummary::Code(0)
    }
}

impl From<ExitStatus> for ExitSummary {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitSummary::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitSummary::Signal(signal);
            }
        }
        ExitSummary::Unknown
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitSummary::Code(code) => write!(f, "exit code {code}"),
            ExitSummary::Signal(signal) => write!(f, "signal {signal}"),
            ExitSummary::Unknown => write!(f, "unknown exit status"),
        }
    }
}

/// Everything a finished process produced. Output is captured in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitSummary,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// The last `limit` non-empty stderr lines.
    pub fn stderr_tail(&self, limit: usize) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }
}

/// Runs a program to completion, within its deadline, unless cancelled.
///
/// A non-zero or signalled exit is returned as a normal [`ProcessOutput`]; only
/// failures to run the program at all, deadline expiry, and cancellation are errors.
/// Implementations must leave no child process alive on any return path.
#[async_trait]
pub trait ProcessDriver: Send + Sync {
    async fn run(
        &self,
        request: &ProcessRequest,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutput, DriverError>;
}

#[async_trait]
impl<D: ProcessDriver + ?Sized> ProcessDriver for std::sync::Arc<D> {
    async fn run(
        &self,
        request: &ProcessRequest,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutput, DriverError> {
        (**self).run(request, cancel).await
    }
}
