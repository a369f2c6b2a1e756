//! Shared helpers for integration tests: scratch fixture directories.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Directory holding the checked-in C fixtures.
pub fn lang_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/lang")
}

pub fn broken_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/broken")
}

/// A scratch directory of shell fixtures using `#` comments.
pub struct Scratch {
    pub dir: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `name` with the given header lines (without the `#`) followed by `body`.
    pub fn fixture(&self, name: &str, header: &[&str], body: &str) -> PathBuf {
        let mut text = String::new();
        for line in header {
            text.push('#');
            text.push_str(line);
            text.push('\n');
        }
        text.push_str(body);
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    /// A fixture run by `sh` that must print exactly `expected`.
    pub fn sh_case(&self, name: &str, expected: &[&str], body: &str) -> PathBuf {
        let mut header = vec![" Runtime: sh".to_string()];
        for (i, line) in expected.iter().enumerate() {
            if i == 0 {
                header.push(format!("   stdout: {line}"));
            } else {
                header.push(format!("           {line}"));
            }
        }
        if expected.is_empty() {
            header.push("   stdout:".to_string());
        }
        let header: Vec<&str> = header.iter().map(String::as_str).collect();
        self.fixture(name, &header, body)
    }
}
