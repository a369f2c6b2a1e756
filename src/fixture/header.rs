//! Fixture header parsing.
//!
//! A fixture carries its expectation in the first contiguous block of comment lines:
//!
//! ```text
//! // Compiler: <optional invocation spec>
//! // Runtime: <optional invocation spec>
//! //    stdout: <expected line 1>
//! //            <expected line 2>
//! <source code body>
//! ```
//!
//! The parser knows nothing about the language below the header. The comment prefix,
//! the label names, and the rule deciding which lines continue a multi-line block are
//! all carried by [`HeaderSyntax`], so the same parser serves `//`, `#`, or `--`
//! languages alike.

use std::path::Path;
use std::sync::Arc;

use miette::{NamedSource, SourceSpan};
use serde::Deserialize;
use tracing::warn;

use super::Expectation;
use crate::diagnostics::LoadError;

/// Decides whether an indented header line continues the open `stdout:`/`stdin:` block.
///
/// Indentation is measured after the comment prefix.
/// In a harness file the rule is written as a bare name (`deeper_than_label`,
/// `aligned_with_value`) or as the map `{ min_indent: N }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RuleSetting")]
pub enum ContinuationRule {
    /// Indented strictly deeper than the block's label.
    #[default]
    DeeperThanLabel,
    /// Indented at least as far as the column where the label's value began.
    AlignedWithValue,
    /// Indented at least this many columns.
    MinIndent(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleSetting {
    Named(NamedRule),
    MinIndent {
        min_indent: usize,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum NamedRule {
    DeeperThanLabel,
    AlignedWithValue,
}

impl From<RuleSetting> for ContinuationRule {
    fn from(setting: RuleSetting) -> Self {
        match setting {
            RuleSetting::Named(NamedRule::DeeperThanLabel) => ContinuationRule::DeeperThanLabel,
            RuleSetting::Named(NamedRule::AlignedWithValue) => ContinuationRule::AlignedWithValue,
            RuleSetting::MinIndent { min_indent } => ContinuationRule::MinIndent(min_indent),
        }
    }
}

impl ContinuationRule {
    fn continues(self, block: &OpenBlock, indent: usize) -> bool {
        match self {
            ContinuationRule::DeeperThanLabel => indent > block.label_indent,
            ContinuationRule::AlignedWithValue => indent >= block.value_column,
            ContinuationRule::MinIndent(min) => indent >= min,
        }
    }
}

/// The lexical shape of a fixture header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSyntax {
    pub comment_prefix: String,
    pub compiler_label: String,
    pub runtime_label: String,
    pub stdout_label: String,
    pub stdin_label: String,
    pub continuation: ContinuationRule,
}

impl Default for HeaderSyntax {
    fn default() -> Self {
        Self {
            comment_prefix: "//".to_string(),
            compiler_label: "Compiler".to_string(),
            runtime_label: "Runtime".to_string(),
            stdout_label: "stdout".to_string(),
            stdin_label: "stdin".to_string(),
            continuation: ContinuationRule::default(),
        }
    }
}

impl HeaderSyntax {
    pub fn with_comment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comment_prefix = prefix.into();
        self
    }

    pub fn with_continuation(mut self, rule: ContinuationRule) -> Self {
        self.continuation = rule;
        self
    }

    fn field_for(&self, label: &str) -> Option<Field> {
        [
            (&self.compiler_label, Field::Compiler),
            (&self.runtime_label, Field::Runtime),
            (&self.stdout_label, Field::Stdout),
            (&self.stdin_label, Field::Stdin),
        ]
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label))
        .map(|(_, field)| field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Compiler,
    Runtime,
    Stdout,
    Stdin,
}

#[derive(Debug)]
struct OpenBlock {
    field: Field,
    label_indent: usize,
    value_column: usize,
}

#[derive(Debug, Default)]
struct Fields {
    compiler: Option<String>,
    runtime: Option<String>,
    stdout: Option<Vec<String>>,
    stdin: Option<Vec<String>>,
}

impl Fields {
    fn single_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Compiler => &mut self.compiler,
            _ => &mut self.runtime,
        }
    }

    fn block_mut(&mut self, field: Field) -> &mut Option<Vec<String>> {
        match field {
            Field::Stdin => &mut self.stdin,
            _ => &mut self.stdout,
        }
    }
}

/// Parses the header of `content` into an [`Expectation`] for the fixture at `path`.
///
/// Lines before the first comment line (shebangs, blank lines) are skipped; the header
/// ends at the first non-comment line after it. Comment lines that carry no known label
/// are free text and ignored. A comment line with no text closes any open block.
pub fn parse_header(
    path: &Path,
    content: &str,
    syntax: &HeaderSyntax,
) -> Result<Expectation, LoadError> {
    let prefix = syntax.comment_prefix.as_str();
    let mut fields = Fields::default();
    let mut open: Option<OpenBlock> = None;
    let mut seen_header = false;
    let mut header_end = 0;
    let mut offset = 0;

    for raw in content.split_inclusive('\n') {
        let line_start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);

        let Some(body) = line.trim_start().strip_prefix(prefix) else {
            if seen_header {
                break;
            }
            continue;
        };
        seen_header = true;
        header_end = line_start + line.len();

        let text = body.trim_start();
        let indent = body.len() - text.len();
        if text.is_empty() {
            open = None;
            continue;
        }

        if let Some(block) = &open {
            if syntax.continuation.continues(block, indent) {
                if let Some(lines) = fields.block_mut(block.field) {
                    lines.push(text.to_string());
                }
                continue;
            }
            open = None;
        }

        let Some((label, value)) = text.split_once(':') else {
            continue;
        };
        let Some(field) = syntax.field_for(label.trim()) else {
            continue;
        };
        let value_text = value.trim_start();
        let value_column = indent + label.len() + 1 + (value.len() - value_text.len());

        match field {
            Field::Compiler | Field::Runtime => {
                let slot = fields.single_mut(field);
                if slot.is_some() {
                    warn!(file = %path.display(), label = label.trim(), "duplicate header label; last one wins");
                }
                *slot = Some(value_text.trim_end().to_string());
            }
            Field::Stdout | Field::Stdin => {
                let slot = fields.block_mut(field);
                if slot.is_some() {
                    warn!(file = %path.display(), label = label.trim(), "duplicate header label; last one wins");
                }
                *slot = Some(if value_text.is_empty() {
                    Vec::new()
                } else {
                    vec![value_text.to_string()]
                });
                open = Some(OpenBlock {
                    field,
                    label_indent: indent,
                    value_column,
                });
            }
        }
    }

    if !seen_header {
        let first_line = content.lines().next().map_or(0, str::len);
        return Err(malformed(
            path,
            content,
            "header",
            SourceSpan::from((0, first_line)),
            format!(
                "start the file with `{prefix} {}: <expected line>` comment lines",
                syntax.stdout_label
            ),
        ));
    }

    let Some(expected_lines) = fields.stdout else {
        return Err(malformed(
            path,
            content,
            &syntax.stdout_label,
            SourceSpan::from((header_end, 0)),
            format!(
                "declare the expected output with `{prefix} {}: ...`; leave it empty to expect no output",
                syntax.stdout_label
            ),
        ));
    };

    let expectation = Expectation::new(path, fields.compiler, fields.runtime, expected_lines);
    Ok(match fields.stdin {
        Some(lines) => expectation.with_stdin(lines),
        None => expectation,
    })
}

fn malformed(path: &Path, content: &str, field: &str, span: SourceSpan, help: String) -> LoadError {
    LoadError::MalformedFixture {
        file: path.to_path_buf(),
        field: field.to_string(),
        src: Arc::new(NamedSource::new(path.display().to_string(), content.to_string())),
        span,
        help: Some(help),
    }
}
