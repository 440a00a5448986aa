//! Assertion engine: comparison chains, recorded outcomes and describers.

use crate::context::Invocation;
use crate::error::{panic_message, AssertionError, Exception, TestError};
use crate::value::Value;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// One recorded result: an assertion, a failed test, or a failed hook.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// `Some(true)` passed, `Some(false)` failed, `None` the assertion itself
    /// could not be evaluated.
    pub pass: Option<bool>,
    /// Space-joined path of spec names and the test name.
    pub context: String,
    pub message: String,
    /// Diagnostic of a failed or malformed assertion.
    pub error: Option<AssertionError>,
    /// Error that escaped the test body or hook (including timeouts).
    pub test_error: Option<TestError>,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.pass == Some(true)
    }

    pub(crate) fn failure(context: &str, message: String, test_error: Option<TestError>) -> Self {
        Outcome {
            pass: Some(false),
            context: context.to_string(),
            message,
            error: None,
            test_error,
        }
    }
}

/// Labels the single outcome produced by the assertion that returned it.
///
/// ```rust,no_run
/// # let o = ospec::Ospec::new();
/// o.test("labels", |cx| {
///     cx.o(1 + 1).equals(2).describe("addition works");
/// });
/// ```
pub struct Describer {
    outcome: Rc<RefCell<Outcome>>,
}

impl Describer {
    pub(crate) fn new(outcome: Rc<RefCell<Outcome>>) -> Self {
        Describer { outcome }
    }

    /// Replace the outcome's message. Never touches `pass` or the errors.
    pub fn describe(&self, label: impl Into<String>) {
        self.outcome.borrow_mut().message = label.into();
    }
}

/// What a `throws`/`not_throws` assertion expects to be thrown.
#[derive(Clone)]
pub enum ErrorSpec {
    /// Matches the error's `Display` text, or the name or message of an
    /// [`Exception`].
    Message(String),
    /// Matches errors of one concrete type.
    Type {
        name: &'static str,
        matches: fn(&(dyn StdError + 'static)) -> bool,
    },
}

impl ErrorSpec {
    /// Match errors that downcast to `E`.
    pub fn of<E: StdError + 'static>() -> Self {
        ErrorSpec::Type {
            name: std::any::type_name::<E>(),
            matches: is_type::<E>,
        }
    }

    pub fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        match self {
            ErrorSpec::Message(expected) => {
                err.to_string() == *expected
                    || err
                        .downcast_ref::<Exception>()
                        .is_some_and(|e| e.name == *expected || e.message == *expected)
            }
            ErrorSpec::Type { matches, .. } => matches(err),
        }
    }
}

fn is_type<E: StdError + 'static>(err: &(dyn StdError + 'static)) -> bool {
    err.is::<E>()
}

impl fmt::Display for ErrorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSpec::Message(msg) => write!(f, "{msg:?}"),
            ErrorSpec::Type { name, .. } => f.write_str(name),
        }
    }
}

impl From<&str> for ErrorSpec {
    fn from(msg: &str) -> Self {
        ErrorSpec::Message(msg.to_string())
    }
}

impl From<String> for ErrorSpec {
    fn from(msg: String) -> Self {
        ErrorSpec::Message(msg)
    }
}

/// A comparison chain bound to one actual value. Created by
/// [`Context::o`](crate::Context::o); each terminal method records exactly
/// one [`Outcome`].
pub struct Assertion {
    target: Rc<Invocation>,
    actual: Value,
}

impl Assertion {
    pub(crate) fn new(target: Rc<Invocation>, actual: Value) -> Self {
        Assertion { target, actual }
    }

    /// Same primitive value or same identity.
    pub fn equals(self, expected: impl Into<Value>) -> Describer {
        self.compare("should equal", expected.into(), |a, e| a.same(e))
    }

    pub fn not_equals(self, value: impl Into<Value>) -> Describer {
        self.compare("should not equal", value.into(), |a, e| !a.same(e))
    }

    /// Recursive structural equality.
    pub fn deep_equals(self, expected: impl Into<Value>) -> Describer {
        self.compare("should deep equal", expected.into(), |a, e| a.deep_equals(e))
    }

    pub fn not_deep_equals(self, value: impl Into<Value>) -> Describer {
        self.compare("should not deep equal", value.into(), |a, e| {
            !a.deep_equals(e)
        })
    }

    /// Call the actual value with no arguments and expect a matching error.
    pub fn throws(self, spec: impl Into<ErrorSpec>) -> Describer {
        self.expect_throw(spec.into(), true)
    }

    /// Passes when the call raises nothing, or something not matching `spec`.
    pub fn not_throws(self, spec: impl Into<ErrorSpec>) -> Describer {
        self.expect_throw(spec.into(), false)
    }

    fn compare(
        self,
        relation: &'static str,
        expected: Value,
        check: impl FnOnce(&Value, &Value) -> bool,
    ) -> Describer {
        let verdict = catch_unwind(AssertUnwindSafe(|| check(&self.actual, &expected)));
        let (pass, error) = match verdict {
            Ok(true) => (Some(true), None),
            Ok(false) => (
                Some(false),
                Some(AssertionError::Mismatch {
                    actual: self.actual.to_string(),
                    relation,
                    expected: expected.to_string(),
                }),
            ),
            Err(payload) => (None, Some(AssertionError::Malformed(panic_message(&*payload)))),
        };
        self.target.record(pass, error)
    }

    fn expect_throw(self, spec: ErrorSpec, wanted: bool) -> Describer {
        let relation = if wanted { "should throw" } else { "should not throw" };
        let Some(result) = self.actual.call(&[]) else {
            let error = AssertionError::Malformed(format!(
                "`{relation}` needs a function, got {} {}",
                self.actual.kind(),
                self.actual
            ));
            return self.target.record(None, Some(error));
        };

        let (matched, actual) = match &result {
            Ok(_) => (false, "no error".to_string()),
            Err(err) => (spec.matches(&**err), format!("error {err}")),
        };
        if matched == wanted {
            return self.target.record(Some(true), None);
        }
        let error = AssertionError::Mismatch {
            actual,
            relation,
            expected: spec.to_string(),
        };
        self.target.record(Some(false), Some(error))
    }
}
