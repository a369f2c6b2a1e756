//! The expectation model: the parsed, immutable form of one fixture's header.

use std::path::{Path, PathBuf};

pub mod header;

pub use header::{parse_header, ContinuationRule, HeaderSyntax};

/// What one fixture declares about how to build it, how to run it, and what it must print.
///
/// Created once by the case loader and shared read-only (behind an `Arc`) with every
/// worker; there are no mutators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    source_path: PathBuf,
    compiler_spec: Option<String>,
    runtime_spec: Option<String>,
    expected_lines: Vec<String>,
    stdin_lines: Option<Vec<String>>,
}

impl Expectation {
    pub fn new(
        source_path: impl Into<PathBuf>,
        compiler_spec: Option<String>,
        runtime_spec: Option<String>,
        expected_lines: Vec<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            compiler_spec,
            runtime_spec,
            expected_lines,
            stdin_lines: None,
        }
    }

    pub fn with_stdin(mut self, lines: Vec<String>) -> Self {
        self.stdin_lines = Some(lines);
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Display identifier used in reports.
    pub fn id(&self) -> String {
        self.source_path.display().to_string()
    }

    /// `None` skips the compile phase; `Some("")` selects the configured default compiler.
    pub fn compiler_spec(&self) -> Option<&str> {
        self.compiler_spec.as_deref()
    }

    /// `None` or `Some("")` runs the program directly.
    pub fn runtime_spec(&self) -> Option<&str> {
        self.runtime_spec.as_deref()
    }

    pub fn expected_lines(&self) -> &[String] {
        &self.expected_lines
    }

    pub fn stdin_lines(&self) -> Option<&[String]> {
        self.stdin_lines.as_deref()
    }

    /// Bytes fed to the running program, one newline after each declared line.
    pub fn stdin_bytes(&self) -> Option<Vec<u8>> {
        self.stdin_lines.as_ref().map(|lines| {
            let mut bytes = Vec::new();
            for line in lines {
                bytes.extend_from_slice(line.as_bytes());
                bytes.push(b'\n');
            }
            bytes
        })
    }
}
