//! Positional line comparison of captured stdout against the golden output.

use std::fmt;

use serde::Serialize;

/// Which side of a comparison ran longer, and by how many lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extra {
    Expected(usize),
    Actual(usize),
}

/// The first divergence between expected and actual output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// 1-based line index.
    pub line: usize,
    /// `None` when the expected output ended first.
    pub expected: Option<String>,
    /// `None` when the actual output ended first.
    pub actual: Option<String>,
    pub extra: Option<Extra>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: expected ", self.line)?;
        match &self.expected {
            Some(line) => write!(f, "{line:?}")?,
            None => write!(f, "end of output")?,
        }
        write!(f, ", got ")?;
        match &self.actual {
            Some(line) => write!(f, "{line:?}")?,
            None => write!(f, "end of output")?,
        }
        match self.extra {
            Some(Extra::Expected(n)) => write!(f, " (expected has {n} more {})", plural(n)),
            Some(Extra::Actual(n)) => write!(f, " (actual has {n} more {})", plural(n)),
            None => Ok(()),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "line"
    } else {
        "lines"
    }
}

/// Splits captured stdout into lines. `\r\n` counts as a line break, and a single
/// trailing empty segment (from a final newline) is dropped.
pub fn split_output(stdout: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(stdout);
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

/// Compares line by line and stops at the first divergence.
pub fn compare_lines(expected: &[String], actual: &[String]) -> Option<Mismatch> {
    let longest = expected.len().max(actual.len());
    let index = (0..longest).find(|&i| expected.get(i) != actual.get(i))?;
    let extra = match expected.len().cmp(&actual.len()) {
        std::cmp::Ordering::Less => Some(Extra::Actual(actual.len() - expected.len())),
        std::cmp::Ordering::Greater => Some(Extra::Expected(expected.len() - actual.len())),
        std::cmp::Ordering::Equal => None,
    };
    Some(Mismatch {
        line: index + 1,
        expected: expected.get(index).cloned(),
        actual: actual.get(index).cloned(),
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn trailing_newline_is_normalized() {
        assert_eq!(split_output(b"a\nb\n"), ["a", "b"]);
        assert_eq!(split_output(b"a\nb"), ["a", "b"]);
        assert_eq!(split_output(b"a\r\nb\r\n"), ["a", "b"]);
        assert!(split_output(b"").is_empty());
    }

    #[test]
    fn interior_blank_lines_are_kept() {
        assert_eq!(split_output(b"a\n\nb\n\n"), ["a", "", "b", ""]);
    }

    #[test]
    fn identical_output_has_no_mismatch() {
        let expected = lines(&["int args: -1, 0, 1", "double args: 1.500000, 0.800000"]);
        assert_eq!(compare_lines(&expected, &expected.clone()), None);
    }

    #[test]
    fn reports_first_divergent_index_regardless_of_tail() {
        let expected = lines(&["a", "b", "c", "d", "e"]);
        let actual = lines(&["a", "x", "c", "y", "z"]);
        let m = compare_lines(&expected, &actual).unwrap();
        assert_eq!(m.line, 2);
        assert_eq!(m.expected.as_deref(), Some("b"));
        assert_eq!(m.actual.as_deref(), Some("x"));
        assert_eq!(m.extra, None);
    }

    #[test]
    fn swapped_lines_are_caught() {
        let expected = lines(&["2=1 is false", "2 is two", "2 doesn't equal 1"]);
        let actual = lines(&["2=1 is false", "2 doesn't equal 1", "2 is two"]);
        assert_eq!(compare_lines(&expected, &actual).unwrap().line, 2);
    }

    #[test]
    fn missing_line_reports_which_side_is_longer() {
        let expected = lines(&["a", "b", "c"]);
        let actual = lines(&["a", "b"]);
        let m = compare_lines(&expected, &actual).unwrap();
        assert_eq!(m.line, 3);
        assert_eq!(m.actual, None);
        assert_eq!(m.extra, Some(Extra::Expected(1)));
        assert_eq!(
            m.to_string(),
            "line 3: expected \"c\", got end of output (expected has 1 more line)"
        );
    }

    #[test]
    fn surplus_output_is_a_mismatch() {
        let m = compare_lines(&lines(&["a"]), &lines(&["a", "b", "c"])).unwrap();
        assert_eq!(m.line, 2);
        assert_eq!(m.extra, Some(Extra::Actual(2)));
        assert_eq!(
            m.to_string(),
            "line 2: expected end of output, got \"b\" (actual has 2 more lines)"
        );
    }

    #[test]
    fn length_difference_with_early_divergence_still_notes_extra() {
        let m = compare_lines(&lines(&["a", "b"]), &lines(&["z"])).unwrap();
        assert_eq!(m.line, 1);
        assert_eq!(m.extra, Some(Extra::Expected(1)));
    }
}
