//! Dynamic values compared by the assertion engine.
//!
//! Primitives compare by value. Arrays, objects and functions are shared
//! (`Rc`) and carry an identity, so `equals` can distinguish "the same
//! object" from "an equal object", and cyclic structures can be built.

use crate::error::{BoxError, Exception};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Signature of a callable stored in a [`Value::Function`].
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, BoxError>;

/// A dynamically typed value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<IndexMap<String, Value>>>),
    Function(Rc<NativeFn>),
}

impl Value {
    /// A new array with its own identity.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
        Value::Array(Rc::new(RefCell::new(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    /// A new object with its own identity. Later duplicate keys win.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(Rc::new(RefCell::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )))
    }

    /// Wrap a zero-argument closure as a callable value.
    ///
    /// ```rust
    /// use ospec::{Exception, Value};
    ///
    /// let ok = Value::func(|| ());
    /// let failing = Value::func(|| Err::<(), _>(Exception::new("TypeError", "nope")));
    /// assert!(ok.call(&[]).unwrap().is_ok());
    /// assert!(failing.call(&[]).unwrap().is_err());
    /// ```
    pub fn func<F, T>(f: F) -> Value
    where
        F: Fn() -> T + 'static,
        T: IntoReturn,
    {
        Value::Function(Rc::new(move |_: &[Value]| f().into_return()))
    }

    /// Wrap a closure that receives the call arguments.
    pub fn native(f: impl Fn(&[Value]) -> Result<Value, BoxError> + 'static) -> Value {
        Value::Function(Rc::new(f))
    }

    /// Append to an array. Returns `false` if `self` is not an array.
    pub fn push(&self, item: impl Into<Value>) -> bool {
        match self {
            Value::Array(items) => {
                items.borrow_mut().push(item.into());
                true
            }
            _ => false,
        }
    }

    /// Set an object key. Returns `false` if `self` is not an object.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self {
            Value::Object(entries) => {
                entries.borrow_mut().insert(key.into(), value.into());
                true
            }
            _ => false,
        }
    }

    /// Invoke a function value. Returns `None` if `self` is not callable.
    ///
    /// A panic inside the callable is converted into an `Exception` named
    /// `Panic` so callers see a single error channel.
    pub fn call(&self, args: &[Value]) -> Option<Result<Value, BoxError>> {
        let Value::Function(f) = self else {
            return None;
        };
        let result = catch_unwind(AssertUnwindSafe(|| f(args))).unwrap_or_else(|payload| {
            Err(Exception::new("Panic", crate::error::panic_message(&*payload)).into())
        });
        Some(result)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Short name of the value's type category.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Strict equality: same primitive value or same identity.
    ///
    /// `NaN` is the same value as `NaN`, so every value is the same as itself.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => same_number(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => same_fn(a, b),
            _ => false,
        }
    }

    /// Structural equality. Terminates on cyclic structures.
    pub fn deep_equals(&self, other: &Value) -> bool {
        DeepEq::default().eq(self, other)
    }
}

fn same_number(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn same_fn(a: &Rc<NativeFn>, b: &Rc<NativeFn>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Deep comparison state: identity pairs currently (or already) under
/// comparison. Revisiting a pair means both sides cycled back to positions
/// already being matched, which counts as equal.
#[derive(Default)]
struct DeepEq {
    seen: HashSet<(usize, usize)>,
}

impl DeepEq {
    fn eq(&mut self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) || !self.seen.insert((addr(a), addr(b))) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(l, r)| self.eq(l, r))
            }
            (Value::Object(a), Value::Object(b)) => {
                if Rc::ptr_eq(a, b) || !self.seen.insert((addr(a), addr(b))) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(key, l)| match b.get(key) {
                        Some(r) => self.eq(l, r),
                        None => false,
                    })
            }
            _ => left.same(right),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// `ancestors` holds the containers on the current path; only those print as
// `[Circular]`, shared siblings print in full.
fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, ancestors: &mut Vec<usize>) -> fmt::Result {
    match value {
        Value::Undefined => f.write_str("undefined"),
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::Function(_) => f.write_str("[Function]"),
        Value::Array(items) => {
            if ancestors.contains(&addr(items)) {
                return f.write_str("[Circular]");
            }
            ancestors.push(addr(items));
            f.write_str("[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_value(f, item, ancestors)?;
            }
            ancestors.pop();
            f.write_str("]")
        }
        Value::Object(entries) => {
            if ancestors.contains(&addr(entries)) {
                return f.write_str("[Circular]");
            }
            ancestors.push(addr(entries));
            f.write_str("{")?;
            for (i, (key, item)) in entries.borrow().iter().enumerate() {
                f.write_str(if i > 0 { ", " } else { " " })?;
                write!(f, "{key}: ")?;
                write_value(f, item, ancestors)?;
            }
            ancestors.pop();
            if entries.borrow().is_empty() {
                f.write_str("}")
            } else {
                f.write_str(" }")
            }
        }
    }
}

/// Return types accepted by [`Value::func`].
pub trait IntoReturn {
    fn into_return(self) -> Result<Value, BoxError>;
}

impl IntoReturn for () {
    fn into_return(self) -> Result<Value, BoxError> {
        Ok(Value::Undefined)
    }
}

impl<T, E> IntoReturn for Result<T, E>
where
    T: Into<Value>,
    E: Into<BoxError>,
{
    fn into_return(self) -> Result<Value, BoxError> {
        self.map(Into::into).map_err(Into::into)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}
