//! The result aggregator: per-case lines, load errors, and the trailing summary.
//!
//! Text output is colored through `termcolor` and goes to whatever [`WriteColor`] the
//! caller provides; JSON output is buffered and written as one document on
//! [`Aggregator::finish`].

use std::fmt;
use std::io;

use difference::{Changeset, Difference};
use miette::{GraphicalReportHandler, GraphicalTheme};
use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::diagnostics::LoadError;
use crate::process::ExitSummary;
use crate::runner::{Mismatch, Outcome, Phase, Status};

// ============================================================================
// SUMMARY
// ============================================================================

/// Final tallies of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub load_errors: usize,
    pub not_run: usize,
}

impl Summary {
    /// `0` only when every discovered case loaded, ran, and passed.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.load_errors == 0 && self.not_run == 0 {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} load errors",
            self.passed, self.failed, self.load_errors
        )?;
        if self.not_run > 0 {
            write!(f, ", {} not run", self.not_run)?;
        }
        Ok(())
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Output style of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Text { verbose: bool },
    Json,
}

/// Accumulates outcomes and load errors and writes the report.
pub struct Aggregator<W> {
    out: W,
    style: Style,
    summary: Summary,
    cases: Vec<CaseRecord>,
    loads: Vec<LoadRecord>,
}

impl<W: WriteColor> Aggregator<W> {
    pub fn new(out: W, style: Style) -> Self {
        Self {
            out,
            style,
            summary: Summary::default(),
            cases: Vec::new(),
            loads: Vec::new(),
        }
    }

    /// Records one outcome; text style prints its line immediately.
    pub fn case(&mut self, outcome: &Outcome) -> io::Result<()> {
        if outcome.status.is_pass() {
            self.summary.passed += 1;
        } else {
            self.summary.failed += 1;
        }
        match self.style {
            Style::Text { verbose } => self.write_case(outcome, verbose),
            Style::Json => {
                self.cases.push(CaseRecord::from(outcome));
                Ok(())
            }
        }
    }

    pub fn load_error(&mut self, error: &LoadError) -> io::Result<()> {
        self.summary.load_errors += 1;
        match self.style {
            Style::Text { verbose } => self.write_load_error(error, verbose),
            Style::Json => {
                self.loads.push(LoadRecord {
                    file: error.file().display().to_string(),
                    error: error.summary(),
                });
                Ok(())
            }
        }
    }

    /// Writes the summary (or the JSON document) and returns the tallies.
    pub fn finish(&mut self, not_run: usize) -> io::Result<Summary> {
        self.summary.not_run = not_run;
        match self.style {
            Style::Text { .. } => {
                writeln!(self.out)?;
                let color = if self.summary.exit_code() == 0 {
                    Color::Green
                } else {
                    Color::Red
                };
                self.out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
                write!(self.out, "{}", self.summary)?;
                self.out.reset()?;
                writeln!(self.out)?;
            }
            Style::Json => {
                let document = Document {
                    cases: &self.cases,
                    load_errors: &self.loads,
                    summary: self.summary,
                };
                serde_json::to_writer_pretty(&mut self.out, &document)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        Ok(self.summary)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_case(&mut self, outcome: &Outcome, verbose: bool) -> io::Result<()> {
        if outcome.status.is_pass() {
            self.tag("PASS", Color::Green)?;
            writeln!(self.out, " {}", outcome.id())?;
            return Ok(());
        }

        self.tag("FAIL", Color::Red)?;
        writeln!(
            self.out,
            " {} [{}] {}",
            outcome.id(),
            outcome.status,
            outcome.diagnostic
        )?;
        if !verbose {
            return Ok(());
        }
        if outcome.status == Status::OutputMismatch {
            let expected = outcome.case.expected_lines().join("\n");
            let actual = outcome.actual_lines.join("\n");
            let changeset = Changeset::new(&expected, &actual, "\n");
            write_diff(&mut self.out, &changeset.diffs)?;
        }
        for line in &outcome.stderr_tail {
            writeln!(self.out, "    stderr | {line}")?;
        }
        Ok(())
    }

    fn write_load_error(&mut self, error: &LoadError, verbose: bool) -> io::Result<()> {
        self.tag("LOAD", Color::Yellow)?;
        writeln!(self.out, " {}: {}", error.file().display(), error.summary())?;
        if verbose {
            let theme = if self.out.supports_color() {
                GraphicalTheme::unicode()
            } else {
                GraphicalTheme::unicode_nocolor()
            };
            let mut rendered = String::new();
            GraphicalReportHandler::new_themed(theme)
                .render_report(&mut rendered, error)
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "cannot render diagnostic"))?;
            write!(self.out, "{rendered}")?;
        }
        Ok(())
    }

    fn tag(&mut self, text: &str, color: Color) -> io::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }
}

/// Writes a line diff of expected (`-`) against actual (`+`) output.
fn write_diff<W: WriteColor>(out: &mut W, diffs: &[Difference]) -> io::Result<()> {
    for diff in diffs {
        match diff {
            Difference::Same(text) => {
                for line in text.lines() {
                    writeln!(out, "     {line}")?;
                }
            }
            Difference::Rem(text) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
                for line in text.lines() {
                    writeln!(out, "    -{line}")?;
                }
                out.reset()?;
            }
            Difference::Add(text) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                for line in text.lines() {
                    writeln!(out, "    +{line}")?;
                }
                out.reset()?;
            }
        }
    }
    Ok(())
}

// ============================================================================
// JSON DOCUMENT
// ============================================================================

#[derive(Debug, Serialize)]
struct CaseRecord {
    id: String,
    status: Status,
    phase: Phase,
    #[serde(skip_serializing_if = "String::is_empty")]
    diagnostic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mismatch: Option<Mismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit: Option<ExitSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stderr_tail: Vec<String>,
    elapsed_ms: u128,
}

impl From<&Outcome> for CaseRecord {
    fn from(outcome: &Outcome) -> Self {
        Self {
            id: outcome.id(),
            status: outcome.status,
            phase: outcome.phase,
            diagnostic: outcome.diagnostic.clone(),
            mismatch: outcome.mismatch.clone(),
            exit: outcome.exit,
            stderr_tail: outcome.stderr_tail.clone(),
            elapsed_ms: outcome.elapsed.as_millis(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoadRecord {
    file: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    cases: &'a [CaseRecord],
    load_errors: &'a [LoadRecord],
    summary: Summary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{parse_header, Expectation, HeaderSyntax};
    use crate::runner::compare_lines;
    use std::path::Path;
    use std::sync::Arc;
    use termcolor::Buffer;

    fn case(lines: &[&str]) -> Arc<Expectation> {
        Arc::new(Expectation::new(
            "tests/if.c",
            None,
            None,
            lines.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn mismatch_outcome() -> Outcome {
        let case = case(&["a", "b", "c"]);
        let actual: Vec<String> = vec!["a".into(), "x".into(), "c".into()];
        let mismatch = compare_lines(case.expected_lines(), &actual).unwrap();
        Outcome::new(
            case,
            Status::OutputMismatch,
            Phase::Compare,
            format!("compare: {mismatch}"),
        )
        .with_mismatch(mismatch)
        .with_actual_lines(actual)
    }

    fn finished(mut aggregator: Aggregator<Buffer>, not_run: usize) -> (String, Summary) {
        let summary = aggregator.finish(not_run).unwrap();
        let printed = String::from_utf8(aggregator.into_inner().into_inner()).unwrap();
        (printed, summary)
    }

    fn load_error() -> LoadError {
        parse_header(Path::new("bad.c"), "// Compiler:\nint x;\n", &HeaderSyntax::default())
            .unwrap_err()
    }

    #[test]
    fn summary_line_format() {
        let summary = Summary {
            passed: 3,
            failed: 1,
            load_errors: 2,
            not_run: 0,
        };
        assert_eq!(summary.to_string(), "3 passed, 1 failed, 2 load errors");
        assert_eq!(summary.exit_code(), 1);
        let aborted = Summary {
            not_run: 4,
            ..Summary::default()
        };
        assert_eq!(aborted.to_string(), "0 passed, 0 failed, 0 load errors, 4 not run");
        assert_eq!(aborted.exit_code(), 1);
        assert_eq!(Summary::default().exit_code(), 0);
    }

    #[test]
    fn one_line_per_case_then_summary() {
        let mut agg = Aggregator::new(Buffer::no_color(), Style::Text { verbose: false });
        agg.case(&Outcome::new(case(&["a"]), Status::Passed, Phase::Compare, ""))
            .unwrap();
        agg.case(&mismatch_outcome()).unwrap();
        agg.load_error(&load_error()).unwrap();

        let (printed, summary) = finished(agg, 0);
        assert_eq!(
            printed,
            "PASS tests/if.c\n\
             FAIL tests/if.c [output mismatch] compare: line 2: expected \"b\", got \"x\"\n\
             LOAD bad.c: missing stdout\n\
             \n\
             1 passed, 1 failed, 1 load errors\n"
        );
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                failed: 1,
                load_errors: 1,
                not_run: 0
            }
        );
    }

    #[test]
    fn verbose_mismatch_shows_line_diff() {
        let mut agg = Aggregator::new(Buffer::no_color(), Style::Text { verbose: true });
        agg.case(&mismatch_outcome()).unwrap();
        let (printed, _) = finished(agg, 0);
        assert!(printed.contains("    -b\n"));
        assert!(printed.contains("    +x\n"));
        assert!(printed.contains("     a\n"));
    }

    #[test]
    fn verbose_failure_shows_stderr_tail() {
        let outcome = Outcome::new(
            case(&["a"]),
            Status::RuntimeFailed,
            Phase::Run,
            "run: `./if` failed with exit code 2: boom",
        )
        .with_exit(ExitSummary::Code(2), vec!["warming up".into(), "boom".into()]);
        let mut agg = Aggregator::new(Buffer::no_color(), Style::Text { verbose: true });
        agg.case(&outcome).unwrap();
        let (printed, summary) = finished(agg, 0);
        assert!(printed.contains("FAIL tests/if.c [runtime failed] run: `./if` failed with exit code 2: boom\n"));
        assert!(printed.contains("    stderr | warming up\n    stderr | boom\n"));
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn verbose_load_error_renders_the_header() {
        let mut agg = Aggregator::new(Buffer::no_color(), Style::Text { verbose: true });
        agg.load_error(&load_error()).unwrap();
        let (printed, _) = finished(agg, 0);
        assert!(printed.starts_with("LOAD bad.c: missing stdout\n"));
        assert!(printed.contains("goldrun::load::malformed"));
    }

    #[test]
    fn json_document_carries_cases_and_summary() {
        let mut agg = Aggregator::new(Buffer::no_color(), Style::Json);
        agg.case(&mismatch_outcome()).unwrap();
        agg.load_error(&load_error()).unwrap();
        let (printed, _) = finished(agg, 2);

        let doc: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(doc["cases"][0]["id"], "tests/if.c");
        assert_eq!(doc["cases"][0]["status"], "output_mismatch");
        assert_eq!(doc["cases"][0]["mismatch"]["line"], 2);
        assert_eq!(doc["load_errors"][0]["error"], "missing stdout");
        assert_eq!(doc["summary"]["failed"], 1);
        assert_eq!(doc["summary"]["not_run"], 2);
    }
}
