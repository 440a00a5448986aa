//! Reducing an outcome sequence to an exit status.
//!
//! The default reporter prints plain text:
//!
//! ```text
//! ✓ math add (2)
//! ✗ math divide (1 of 2 failed)
//!     1
//!       should equal
//!     2
//!
//! FAIL
//! 3 passed, 1 failed
//! ```

use crate::assert::Outcome;
use crate::error::TestError;
use indexmap::IndexMap;
use std::io::{self, Write};

/// Turns the full outcome sequence into an exit status.
pub trait Reporter {
    /// Returns the number of failures; 0 means success.
    fn report(&self, outcomes: &[Outcome]) -> usize;
}

impl<F> Reporter for F
where
    F: Fn(&[Outcome]) -> usize,
{
    fn report(&self, outcomes: &[Outcome]) -> usize {
        self(outcomes)
    }
}

/// Prints outcomes grouped by context, followed by totals, to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReporter;

#[derive(Default)]
struct Group<'o> {
    passed: usize,
    failures: Vec<&'o Outcome>,
}

impl DefaultReporter {
    /// Render into `out` and return the failure count.
    pub fn to_writer(&self, outcomes: &[Outcome], out: &mut impl Write) -> io::Result<usize> {
        let mut groups: IndexMap<&str, Group<'_>> = IndexMap::new();
        for outcome in outcomes {
            let group = groups.entry(outcome.context.as_str()).or_default();
            if outcome.passed() {
                group.passed += 1;
            } else {
                group.failures.push(outcome);
            }
        }

        let mut passed = 0;
        let mut failed = 0;
        for (context, group) in &groups {
            passed += group.passed;
            failed += group.failures.len();
            if group.failures.is_empty() {
                writeln!(out, "✓ {context} ({})", group.passed)?;
                continue;
            }
            let total = group.passed + group.failures.len();
            writeln!(out, "✗ {context} ({} of {total} failed)", group.failures.len())?;
            for outcome in &group.failures {
                write_failure(out, outcome)?;
            }
        }

        writeln!(out)?;
        writeln!(out, "{}", if failed == 0 { "PASS" } else { "FAIL" })?;
        writeln!(out, "{passed} passed, {failed} failed")?;
        Ok(failed)
    }
}

fn write_failure(out: &mut impl Write, outcome: &Outcome) -> io::Result<()> {
    let detail = match (&outcome.error, &outcome.test_error) {
        (Some(err), _) => err.to_string(),
        (None, Some(err @ TestError::Failed(_))) => err.to_string(),
        (None, Some(err)) => format!("Error: {err}"),
        (None, None) => String::new(),
    };
    let mut lines: Vec<&str> = Vec::new();
    if !outcome.message.is_empty() && outcome.message != detail {
        lines.extend(outcome.message.lines());
    }
    lines.extend(detail.lines());
    if outcome.pass.is_none() {
        lines.insert(0, "(assertion could not be evaluated)");
    }
    for line in lines {
        writeln!(out, "    {line}")?;
    }
    Ok(())
}

impl Reporter for DefaultReporter {
    fn report(&self, outcomes: &[Outcome]) -> usize {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match self.to_writer(outcomes, &mut out) {
            Ok(failed) => failed,
            Err(err) => {
                tracing::warn!(error = %err, "could not write the report");
                failure_count(outcomes)
            }
        }
    }
}

/// Report to stdout with [`DefaultReporter`].
pub fn report(outcomes: &[Outcome]) -> usize {
    DefaultReporter.report(outcomes)
}

/// Number of outcomes that did not pass.
pub fn failure_count(outcomes: &[Outcome]) -> usize {
    outcomes.iter().filter(|o| !o.passed()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssertionError, Exception};
    use pretty_assertions::assert_eq;

    fn outcome(context: &str, pass: Option<bool>) -> Outcome {
        Outcome {
            pass,
            context: context.to_string(),
            message: String::new(),
            error: None,
            test_error: None,
        }
    }

    fn render(outcomes: &[Outcome]) -> (usize, String) {
        let mut buf = Vec::new();
        let failed = DefaultReporter.to_writer(outcomes, &mut buf).unwrap();
        (failed, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_all_passing() {
        let (failed, text) = render(&[outcome("math add", Some(true)), outcome("math add", Some(true))]);
        assert_eq!(failed, 0);
        assert_eq!(text, "✓ math add (2)\n\nPASS\n2 passed, 0 failed\n");
    }

    #[test]
    fn test_groups_failures_by_context() {
        let mut mismatch = outcome("math divide", Some(false));
        mismatch.error = Some(AssertionError::Mismatch {
            actual: "1".into(),
            relation: "should equal",
            expected: "2".into(),
        });
        mismatch.message = "halves".into();
        let mut timed_out = outcome("slow", Some(false));
        timed_out.test_error = Some(TestError::Timeout { ms: 20 });
        timed_out.message = timed_out.test_error.as_ref().unwrap().to_string();

        let outcomes = [
            outcome("math divide", Some(true)),
            mismatch,
            outcome("math add", Some(true)),
            timed_out,
        ];
        let (failed, text) = render(&outcomes);
        assert_eq!(failed, 2);
        assert_eq!(
            text,
            "✗ math divide (1 of 2 failed)\n    halves\n    1\n      should equal\n    2\n\
             ✓ math add (1)\n\
             ✗ slow (1 of 1 failed)\n    timed out after 20ms\n    Error: timed out after 20ms\n\
             \nFAIL\n2 passed, 2 failed\n"
        );
    }

    #[test]
    fn test_failed_body_error_is_not_double_prefixed() {
        let mut failed = outcome("io", Some(false));
        failed.test_error = Some(Exception::msg("x").into());
        let (_, text) = render(&[failed]);
        assert_eq!(text, "✗ io (1 of 1 failed)\n    Error: x\n\nFAIL\n0 passed, 1 failed\n");
    }

    #[test]
    fn test_malformed_counts_as_failure() {
        let outcomes = [outcome("weird", None)];
        assert_eq!(failure_count(&outcomes), 1);
        let (failed, text) = render(&outcomes);
        assert_eq!(failed, 1);
        assert!(text.contains("(assertion could not be evaluated)"));
    }

    #[test]
    fn test_closures_are_reporters() {
        let count_all = |outcomes: &[Outcome]| outcomes.len();
        assert_eq!(count_all.report(&[outcome("x", Some(true))]), 1);
    }
}
