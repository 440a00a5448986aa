//! # ospec: a hierarchical test runtime with hooks, async completion and spies
//!
//! Tests are registered into a spec tree, then run one at a time by a
//! cooperative, single-threaded scheduler. Every assertion is recorded as an
//! [`Outcome`]; a [`Reporter`] turns the ordered outcomes into an exit status.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use ospec::{Completion, Ospec};
//! use std::time::Duration;
//!
//! let o = Ospec::new();
//! o.spec("math", |o| {
//!     o.before_each(|_| {
//!         // reset shared state
//!     });
//!
//!     o.test("add", |cx| {
//!         cx.o(1 + 1).equals(2);
//!     });
//!
//!     o.test("waits for async work", |cx| {
//!         Completion::future(async move {
//!             tokio::time::sleep(Duration::from_millis(5)).await;
//!             cx.o(vec![1, 2]).deep_equals(vec![1, 2]);
//!         })
//!     })
//!     .timeout(100);
//! });
//! std::process::exit(o.run() as i32);
//! ```
//!
//! ## Features
//!
//! - `macros` (default): `#[ospec::main]`, turning a suite function into a
//!   test binary's `main`.

mod assert;
mod builder;
mod config;
mod context;
mod error;
mod report;
mod runtime;
mod scheduler;
mod spy;
mod value;

pub use assert::{Assertion, Describer, ErrorSpec, Outcome};
pub use builder::TestBuilder;
pub use config::RunConfig;
pub use context::{Completion, Context, Done, IntoCompletion, Settlement};
pub use error::{AssertionError, BoxError, ConfigError, Exception, TestError};
pub use report::{failure_count, report, DefaultReporter, Reporter};
pub use runtime::Ospec;
pub use spy::{spy, spy_on, Call, Spy};
pub use value::{IntoReturn, NativeFn, Value};

/// Turns `fn suite(o: &ospec::Ospec)` into a `main` that runs it.
#[cfg(feature = "macros")]
pub use ospec_macros::main;
