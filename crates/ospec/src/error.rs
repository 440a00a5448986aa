//! Error types shared by the assertion engine, the scheduler and configuration.

use std::any::Any;
use std::error::Error as StdError;
use std::rc::Rc;
use thiserror::Error;

/// Boxed error returned by callables stored in a [`Value`](crate::Value).
pub type BoxError = Box<dyn StdError + 'static>;

/// A named error value, for test bodies and callables that want to fail with
/// something more specific than a string.
///
/// ```rust
/// use ospec::Exception;
///
/// let err = Exception::new("RangeError", "index out of bounds");
/// assert_eq!(err.to_string(), "RangeError: index out of bounds");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct Exception {
    pub name: String,
    pub message: String,
}

impl Exception {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Exception {
            name: name.into(),
            message: message.into(),
        }
    }

    /// An `Exception` with the generic name `Error`.
    pub fn msg(message: impl Into<String>) -> Self {
        Exception::new("Error", message)
    }
}

/// Diagnostic attached to an assertion outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssertionError {
    /// The comparison ran and was false.
    #[error("{actual}\n  {relation}\n{expected}")]
    Mismatch {
        actual: String,
        relation: &'static str,
        expected: String,
    },

    /// The assertion could not be evaluated at all.
    #[error("malformed assertion: {0}")]
    Malformed(String),
}

/// Failure of a test body or hook, as opposed to a failed comparison.
#[derive(Error, Debug, Clone)]
pub enum TestError {
    /// An error returned from the body, passed to `Done::fail`, or produced
    /// by a returned future.
    #[error("{0}")]
    Failed(Rc<dyn StdError + 'static>),

    /// The body panicked.
    #[error("panicked: {0}")]
    Panic(String),

    /// The body did not complete before its deadline.
    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl TestError {
    pub fn from_error(err: impl StdError + 'static) -> Self {
        TestError::Failed(Rc::new(err))
    }

    /// The bare message, without the `name:` prefix an [`Exception`] renders.
    pub fn message(&self) -> String {
        match self {
            TestError::Failed(err) => match err.downcast_ref::<Exception>() {
                Some(exception) => exception.message.clone(),
                None => err.to_string(),
            },
            TestError::Panic(msg) => msg.clone(),
            TestError::Timeout { .. } => self.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TestError::Timeout { .. })
    }
}

impl From<Exception> for TestError {
    fn from(err: Exception) -> Self {
        TestError::from_error(err)
    }
}

impl From<BoxError> for TestError {
    fn from(err: BoxError) -> Self {
        TestError::Failed(Rc::from(err))
    }
}

impl From<String> for TestError {
    fn from(message: String) -> Self {
        Exception::msg(message).into()
    }
}

impl From<&str> for TestError {
    fn from(message: &str) -> Self {
        Exception::msg(message).into()
    }
}

/// Invalid runtime configuration read from the environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
