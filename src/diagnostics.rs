//! Error types for every layer of the harness.
//!
//! Errors fall into three families, mirroring how far a failure propagates:
//!
//! - [`LoadError`]: one fixture could not be turned into an expectation. Recorded and
//!   reported at the end; loading continues with the next file.
//! - [`DriverError`]: an external process could not be run to completion. The case
//!   runner classifies it into an outcome status for that case only.
//! - [`HarnessError`]: the invocation itself is unusable (bad root, bad filter, bad
//!   config). Aborts the whole run with exit code 2.
//!
//! All three derive `miette::Diagnostic` so the CLI can render them with source
//! context where it is available.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

pub type SourceArc = Arc<NamedSource<String>>;

/// A fixture that could not be loaded.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("malformed fixture {}: missing {field}", .file.display())]
    #[diagnostic(code(goldrun::load::malformed))]
    MalformedFixture {
        file: PathBuf,
        field: String,
        #[source_code]
        src: SourceArc,
        #[label("header ends here")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("cannot read fixture {}", .file.display())]
    #[diagnostic(code(goldrun::load::unreadable))]
    Unreadable {
        file: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    pub fn file(&self) -> &Path {
        match self {
            LoadError::MalformedFixture { file, .. } => file,
            LoadError::Unreadable { file, .. } => file,
        }
    }

    /// One-line rendering used by the text report.
    pub fn summary(&self) -> String {
        match self {
            LoadError::MalformedFixture { field, .. } => format!("missing {field}"),
            LoadError::Unreadable { source, .. } => format!("unreadable: {source}"),
        }
    }
}

/// Failure to run an external program to completion.
///
/// A non-zero or signalled exit is *not* a `DriverError`; it is reported in the
/// process output and classified by the case runner.
#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    #[error("cannot spawn `{program}`: {source}")]
    #[diagnostic(code(goldrun::process::spawn))]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o failure while driving `{program}`: {source}")]
    #[diagnostic(code(goldrun::process::io))]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` timed out after {}", humanize(.after))]
    #[diagnostic(code(goldrun::process::timeout))]
    Timeout { program: String, after: Duration },

    #[error("`{program}` aborted by interrupt")]
    #[diagnostic(code(goldrun::process::cancelled))]
    Cancelled { program: String },
}

/// A compiler or runtime spec string that cannot be turned into a command line.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum InvocationError {
    #[error("invocation spec is empty")]
    #[diagnostic(code(goldrun::invocation::empty))]
    Empty,

    #[error("unterminated quote in invocation spec `{0}`")]
    #[diagnostic(code(goldrun::invocation::quote))]
    UnterminatedQuote(String),
}

/// Invocation-level failure. Aborts the run before or instead of executing cases.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("path not found: {}", .0.display())]
    #[diagnostic(code(goldrun::invocation::root), help("pass a fixture file or a directory of fixtures"))]
    RootNotFound(PathBuf),

    #[error("failed to walk {}", .root.display())]
    #[diagnostic(code(goldrun::invocation::walk))]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid filter glob `{glob}`: {reason}")]
    #[diagnostic(code(goldrun::invocation::filter))]
    InvalidFilter { glob: String, reason: String },

    #[error("cannot read config {}", .path.display())]
    #[diagnostic(code(goldrun::config::read))]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}", .path.display())]
    #[diagnostic(code(goldrun::config::parse))]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to start the async runtime")]
    #[diagnostic(code(goldrun::runtime))]
    Runtime(#[source] io::Error),

    #[error("failed to write the report")]
    #[diagnostic(code(goldrun::report))]
    Report(#[source] io::Error),
}

/// Formats a duration the way diagnostics print it: whole seconds when exact,
/// milliseconds otherwise.
pub fn humanize(duration: &Duration) -> String {
    if duration.subsec_millis() == 0 && duration.as_secs() > 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
