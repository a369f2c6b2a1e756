//! Turning a fixture's compiler/runtime spec into a concrete command line.
//!
//! A spec is split into words with shell-like quoting. If its first word names an entry
//! in the [`CommandTable`], the entry's template takes that word's place. Placeholders
//! are then expanded in every word:
//!
//! | placeholder  | value                                      |
//! |--------------|--------------------------------------------|
//! | `{source}`   | absolute path of the fixture               |
//! | `{artifact}` | `<workdir>/<stem>`, the compiler's output  |
//! | `{workdir}`  | the case's private scratch directory       |
//! | `{stem}`     | fixture file name without extension        |
//!
//! A compile command that never mentions `{source}` gets the source path appended as
//! its last argument; a run command that mentions neither `{source}` nor `{artifact}`
//! gets the program path appended.

use std::mem;
use std::path::{Path, PathBuf};

use crate::config::CommandTable;
use crate::diagnostics::InvocationError;

/// Paths substituted into invocation templates for one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub source: PathBuf,
    pub artifact: PathBuf,
    pub workdir: PathBuf,
    pub stem: String,
}

impl Placeholders {
    fn expand(&self, word: &str) -> String {
        word.replace("{source}", &self.source.to_string_lossy())
            .replace("{artifact}", &self.artifact.to_string_lossy())
            .replace("{workdir}", &self.workdir.to_string_lossy())
            .replace("{stem}", &self.stem)
    }
}

/// Which phase an invocation belongs to; decides what counts as naming its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl Stage {
    fn input_markers(self) -> &'static [&'static str] {
        match self {
            Stage::Compile => &["{source}"],
            Stage::Run => &["{source}", "{artifact}"],
        }
    }
}

/// A resolved command line: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Runs `program` directly with no arguments.
    pub fn direct(program: &Path) -> Self {
        Self {
            program: program.to_string_lossy().into_owned(),
            args: Vec::new(),
        }
    }

    /// Resolves `spec` against `table` and expands placeholders. `input` is appended
    /// when the command names no input placeholder for its stage.
    pub fn from_spec(
        spec: &str,
        stage: Stage,
        table: &CommandTable,
        placeholders: &Placeholders,
        input: &Path,
    ) -> Result<Self, InvocationError> {
        let mut words = split_words(spec)?;
        if words.is_empty() {
            return Err(InvocationError::Empty);
        }
        if let Some(template) = table.resolve(&words[0]) {
            let mut resolved = split_words(template)?;
            if resolved.is_empty() {
                return Err(InvocationError::Empty);
            }
            resolved.extend(words.drain(1..));
            words = resolved;
        }

        let markers = stage.input_markers();
        let names_input = words
            .iter()
            .any(|w| markers.iter().any(|marker| w.contains(marker)));
        let mut words: Vec<String> = words.iter().map(|w| placeholders.expand(w)).collect();
        if !names_input {
            words.push(input.to_string_lossy().into_owned());
        }

        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }
}

/// Splits a spec into words. Single quotes are literal; double quotes allow `\"` and
/// `\\`; a bare backslash escapes the next character.
pub fn split_words(spec: &str) -> Result<Vec<String>, InvocationError> {
    let unterminated = || InvocationError::UnterminatedQuote(spec.to_string());
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = spec.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(unterminated()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
