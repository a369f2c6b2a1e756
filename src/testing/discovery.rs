use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};
use walkdir::WalkDir;

use super::glob::GlobFilter;
use crate::diagnostics::{HarnessError, LoadError};
use crate::fixture::{parse_header, Expectation, HeaderSyntax};

/// Everything the loader produced: runnable cases in discovery order plus the
/// fixtures that failed to load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub cases: Vec<Arc<Expectation>>,
    pub errors: Vec<LoadError>,
}

/// Discovers fixture files and parses their headers.
#[derive(Debug, Clone)]
pub struct CaseLoader {
    syntax: HeaderSyntax,
    extensions: Vec<String>,
    prefixes: HashMap<String, String>,
    filter: Option<GlobFilter>,
}

impl Default for CaseLoader {
    fn default() -> Self {
        Self {
            syntax: HeaderSyntax::default(),
            extensions: vec!["c".to_string()],
            prefixes: HashMap::new(),
            filter: None,
        }
    }
}

impl CaseLoader {
    pub fn new(syntax: HeaderSyntax) -> Self {
        Self {
            syntax,
            ..Self::default()
        }
    }

    /// Extensions (without the dot) recognised while walking directories.
    /// Files named explicitly on the command line are loaded regardless.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Overrides the comment prefix for files with the given extension.
    pub fn with_comment_prefix(mut self, extension: &str, prefix: impl Into<String>) -> Self {
        self.prefixes
            .insert(extension.trim_start_matches('.').to_string(), prefix.into());
        self
    }

    pub fn with_filter(mut self, filter: Option<GlobFilter>) -> Self {
        self.filter = filter;
        self
    }

    fn is_fixture_file(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| ext == e.as_str()))
    }

    fn passes_filter(&self, relative: &Path) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(relative))
    }

    /// Resolves every root into fixture paths, in discovery order.
    ///
    /// Roots keep their command-line order; files inside a directory are sorted so the
    /// order is deterministic across runs. A missing root or an unwalkable directory is
    /// an invocation error.
    pub fn discover(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>, HarnessError> {
        let mut files = Vec::new();
        for root in roots {
            if !root.exists() {
                return Err(HarnessError::RootNotFound(root.clone()));
            }
            if root.is_file() {
                let name = root.file_name().map(Path::new).unwrap_or(root.as_path());
                if self.passes_filter(name) {
                    files.push(root.clone());
                }
                continue;
            }
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.map_err(|source| HarnessError::Walk {
                    root: root.clone(),
                    source,
                })?;
                if !entry.file_type().is_file() || !self.is_fixture_file(entry.path()) {
                    continue;
                }
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                if !self.passes_filter(relative) {
                    trace!(path = %entry.path().display(), "filtered out");
                    continue;
                }
                files.push(entry.path().to_path_buf());
            }
        }
        debug!(count = files.len(), "discovered fixtures");
        Ok(files)
    }

    /// Discovers and parses every fixture under `roots`.
    ///
    /// Per-file failures are collected in [`LoadReport::errors`]; they never stop the
    /// remaining files from loading.
    pub fn load(&self, roots: &[PathBuf]) -> Result<LoadReport, HarnessError> {
        let mut report = LoadReport::default();
        for path in self.discover(roots)? {
            match self.load_file(&path) {
                Ok(case) => report.cases.push(Arc::new(case)),
                Err(err) => {
                    debug!(file = %path.display(), error = %err, "fixture rejected");
                    report.errors.push(err);
                }
            }
        }
        Ok(report)
    }

    /// Parses one fixture. The body is never interpreted; non-UTF-8 bytes are
    /// replaced before header parsing.
    pub fn load_file(&self, path: &Path) -> Result<Expectation, LoadError> {
        let bytes = fs::read(path).map_err(|source| LoadError::Unreadable {
            file: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8_lossy(&bytes);
        let prefix = path
            .extension()
            .and_then(|ext| self.prefixes.get(&*ext.to_string_lossy()));
        match prefix {
            Some(prefix) => {
                let syntax = self.syntax.clone().with_comment_prefix(prefix.as_str());
                parse_header(path, &content, &syntax)
            }
            None => parse_header(path, &content, &self.syntax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn discovery_is_sorted_and_extension_filtered() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.c", "// stdout: b\n");
        write(dir.path(), "a.c", "// stdout: a\n");
        write(dir.path(), "notes.txt", "nothing");
        write(dir.path(), "sub/c.c", "// stdout: c\n");

        let files = CaseLoader::default()
            .discover(&[dir.path().to_path_buf()])
            .unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            [PathBuf::from("a.c"), PathBuf::from("b.c"), PathBuf::from("sub/c.c")]
        );
    }

    #[test]
    fn malformed_fixture_does_not_block_later_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a_bad.c", "// Compiler:\n// Runtime:\nint main() {}\n");
        write(dir.path(), "b_good.c", "// stdout: ok\nint main() {}\n");

        let report = CaseLoader::default()
            .load(&[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.cases[0].expected_lines(), ["ok"]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].file().ends_with("a_bad.c"));
        assert_eq!(report.errors[0].summary(), "missing stdout");
    }

    #[test]
    fn missing_root_is_an_invocation_error() {
        let err = CaseLoader::default()
            .discover(&[PathBuf::from("/definitely/not/here")])
            .unwrap_err();
        assert!(matches!(err, HarnessError::RootNotFound(_)));
    }

    #[test]
    fn explicit_file_ignores_extension_list() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "script.sh", "# stdout: hi\n");
        let report = CaseLoader::default()
            .with_comment_prefix("sh", "#")
            .load(&[path])
            .unwrap();
        assert_eq!(report.cases.len(), 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn filter_applies_to_relative_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "if.c", "// stdout: a\n");
        write(dir.path(), "division.c", "// stdout: b\n");
        let loader = CaseLoader::default().with_filter(Some(GlobFilter::new("div*").unwrap()));
        let files = loader.discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("division.c"));
    }
}
