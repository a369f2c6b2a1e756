//! Run configuration: the optional YAML harness file and the immutable settings the
//! case runner shares across workers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::diagnostics::HarnessError;
use crate::fixture::ContinuationRule;

/// Compiler template used when a fixture declares an empty `Compiler:` field.
pub const DEFAULT_COMPILER: &str = "cc {source} -o {artifact}";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Contents of a `--config` YAML file. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessFile {
    pub default_compiler: Option<String>,
    pub commands: HashMap<String, String>,
    pub extensions: Vec<String>,
    pub comment_prefix: HashMap<String, String>,
    pub continuation: Option<ContinuationRule>,
    pub timeout: Option<u64>,
    pub jobs: Option<usize>,
}

impl HarnessFile {
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path).map_err(|source| HarnessError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| HarnessError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// Maps a bare command name in a fixture spec to an invocation template.
///
/// The table is supplied by whoever drives the harness; the harness never inspects the
/// templates beyond word splitting and placeholder expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable(HashMap<String, String>);

impl CommandTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for CommandTable {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Read-only settings shared by every worker.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub default_compiler: String,
    pub commands: CommandTable,
    pub timeout: Duration,
    pub jobs: usize,
    pub keep_artifacts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            default_compiler: DEFAULT_COMPILER.to_string(),
            commands: CommandTable::default(),
            timeout: DEFAULT_TIMEOUT,
            jobs: default_jobs(),
            keep_artifacts: false,
        }
    }
}

/// Hardware parallelism, or 1 when it cannot be determined.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}
