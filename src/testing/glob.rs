//! `--filter` glob matching.

use std::path::Path;

use regex::Regex;

use crate::diagnostics::HarnessError;

/// A compiled glob. Supports `*`, `?`, `**`, and `[...]` classes (`[!...]` negates).
#[derive(Debug, Clone)]
pub struct GlobFilter {
    pattern: String,
    regex: Regex,
}

impl GlobFilter {
    pub fn new(glob: &str) -> Result<Self, HarnessError> {
        let invalid = |reason: String| HarnessError::InvalidFilter {
            glob: glob.to_string(),
            reason,
        };
        let source = glob_to_regex(glob).map_err(invalid)?;
        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            pattern: glob.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matches the path relative to its discovery root, or its bare file name.
    pub fn matches(&self, relative: &Path) -> bool {
        let normalized = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if self.regex.is_match(&normalized) {
            return true;
        }
        relative
            .file_name()
            .is_some_and(|name| self.regex.is_match(&name.to_string_lossy()))
    }
}

fn glob_to_regex(glob: &str) -> Result<String, String> {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut class = String::from("[");
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' | '[' | '^' => {
                            class.push('\\');
                            class.push(inner);
                        }
                        _ => class.push(inner),
                    }
                }
                if !closed {
                    return Err("unterminated `[` class".to_string());
                }
                class.push(']');
                out.push_str(&class);
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Ok(out)
}
