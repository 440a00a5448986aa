//! Call-recording spies.

use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// One recorded call.
#[derive(Debug, Clone)]
pub struct Call<A> {
    /// Receiver passed through [`Spy::call_on`], if any.
    pub this: Option<Value>,
    pub args: A,
}

/// A callable that records every invocation and optionally forwards to a
/// wrapped function.
///
/// `A` is the argument type (use a tuple for several arguments). Clones share
/// their call history.
///
/// ```rust
/// let add = ospec::spy_on(|(a, b): (i32, i32)| a + b);
/// assert_eq!(add.call((1, 2)), 3);
/// assert_eq!(add.call_count(), 1);
/// assert_eq!(add.args(), Some((1, 2)));
/// ```
pub struct Spy<A, R = ()> {
    calls: Rc<RefCell<Vec<Call<A>>>>,
    target: Rc<dyn Fn(Option<&Value>, A) -> R>,
}

impl<A: Clone + 'static, R: Default + 'static> Spy<A, R> {
    /// A spy with nothing behind it; every call returns `R::default()`.
    pub fn new() -> Self {
        let target: Rc<dyn Fn(Option<&Value>, A) -> R> =
            Rc::new(|_: Option<&Value>, _: A| R::default());
        Spy {
            calls: Rc::default(),
            target,
        }
    }
}

impl<A: Clone + 'static, R: Default + 'static> Default for Spy<A, R> {
    fn default() -> Self {
        Spy::new()
    }
}

impl<A: Clone + 'static, R: 'static> Spy<A, R> {
    pub fn wrap(f: impl Fn(A) -> R + 'static) -> Self {
        Spy::wrap_method(move |_, args| f(args))
    }

    /// Wrap a function that also receives the receiver given to `call_on`.
    pub fn wrap_method(f: impl Fn(Option<&Value>, A) -> R + 'static) -> Self {
        Spy {
            calls: Rc::default(),
            target: Rc::new(f),
        }
    }

    pub fn call(&self, args: A) -> R {
        self.invoke(None, args)
    }

    pub fn call_on(&self, this: impl Into<Value>, args: A) -> R {
        self.invoke(Some(this.into()), args)
    }

    // Recorded before forwarding so a panicking target is still counted.
    fn invoke(&self, this: Option<Value>, args: A) -> R {
        self.calls.borrow_mut().push(Call {
            this: this.clone(),
            args: args.clone(),
        });
        (self.target)(this.as_ref(), args)
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Arguments of the most recent call.
    pub fn args(&self) -> Option<A> {
        self.calls.borrow().last().map(|call| call.args.clone())
    }

    /// Full call history, oldest first.
    pub fn calls(&self) -> Vec<Call<A>> {
        self.calls.borrow().clone()
    }
}

impl<A, R> Clone for Spy<A, R> {
    fn clone(&self) -> Self {
        Spy {
            calls: self.calls.clone(),
            target: self.target.clone(),
        }
    }
}

impl<A, R> fmt::Debug for Spy<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spy")
            .field("call_count", &self.calls.borrow().len())
            .finish()
    }
}

/// A spy with no wrapped function.
pub fn spy<A: Clone + 'static>() -> Spy<A> {
    Spy::new()
}

/// A spy forwarding to `f`.
pub fn spy_on<A: Clone + 'static, R: 'static>(f: impl Fn(A) -> R + 'static) -> Spy<A, R> {
    Spy::wrap(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_counts_calls_and_keeps_history() {
        let s = spy::<(i32, &str)>();
        for i in 0..3 {
            s.call((i, "x"));
        }
        assert_eq!(s.call_count(), 3);
        assert_eq!(s.args(), Some((2, "x")));
        let history: Vec<i32> = s.calls().iter().map(|c| c.args.0).collect();
        assert_eq!(history, vec![0, 1, 2]);
    }

    #[test]
    fn test_unwrapped_spy_returns_default() {
        let s: Spy<u8, Option<u8>> = Spy::new();
        assert_eq!(s.call(1), None);
        assert_eq!(s.args(), Some(1));
    }

    #[test]
    fn test_forwards_receiver() {
        let s = Spy::wrap_method(|this: Option<&Value>, n: i32| {
            this.map(|v| v.to_string()).unwrap_or_default().len() as i32 + n
        });
        assert_eq!(s.call_on("abc", 1), 6);
        assert_eq!(s.call(1), 1);
        let calls = s.calls();
        assert!(calls[0].this.as_ref().is_some_and(|v| v.same(&Value::from("abc"))));
        assert!(calls[1].this.is_none());
    }

    #[test]
    fn test_records_before_panic_propagates() {
        let s = spy_on(|n: u32| {
            if n > 1 {
                panic!("too big");
            }
            n
        });
        let result = catch_unwind(AssertUnwindSafe(|| s.call(5)));
        assert!(result.is_err());
        assert_eq!(s.call_count(), 1);
        assert_eq!(s.args(), Some(5));
    }

    #[test]
    fn test_clones_share_history() {
        let s = spy::<()>();
        let other = s.clone();
        other.call(());
        assert_eq!(s.call_count(), 1);
    }
}
