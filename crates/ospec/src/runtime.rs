//! The runtime instance: owns one spec tree and runs it.

use crate::assert::Outcome;
use crate::builder::SuiteBuilder;
use crate::config::RunConfig;
use crate::context::{Invocation, Sink};
use crate::report::{DefaultReporter, Reporter};
use crate::scheduler::Scheduler;
use crate::spy::Spy;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::LocalSet;

/// An isolated test runtime.
///
/// Each instance has its own spec tree, default timeout and exclusive-mode
/// state. Clones are handles to the same instance.
#[derive(Clone)]
pub struct Ospec {
    inner: Rc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: RunConfig,
    pub(crate) builder: RefCell<SuiteBuilder>,
    pub(crate) running: Cell<bool>,
    /// Invocation currently being driven by the scheduler, if any.
    pub(crate) current: RefCell<Weak<Invocation>>,
}

impl Default for Ospec {
    fn default() -> Self {
        Ospec::new()
    }
}

impl Ospec {
    pub fn new() -> Self {
        Ospec::with_config(RunConfig::default())
    }

    pub fn with_config(config: RunConfig) -> Self {
        Ospec {
            inner: Rc::new(Inner {
                config,
                builder: RefCell::new(SuiteBuilder::new()),
                running: Cell::new(false),
                current: RefCell::new(Weak::new()),
            }),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.inner.config
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }

    pub(crate) fn with_builder<R>(&self, f: impl FnOnce(&mut SuiteBuilder) -> R) -> R {
        if self.inner.running.get() {
            panic!("ospec: the spec tree cannot be changed while tests are running");
        }
        f(&mut self.inner.builder.borrow_mut())
    }

    /// Set the timeout of the test or hook currently running, `ms` from now.
    ///
    /// # Panics
    /// When no test or hook of this instance is running.
    pub fn timeout(&self, ms: u64) {
        match self.inner.current.borrow().upgrade() {
            Some(invocation) if invocation.is_open() => {
                invocation.set_timeout(Duration::from_millis(ms));
            }
            _ => panic!("ospec: timeout() must be called from inside a running test"),
        }
    }

    /// A spy with no wrapped function. Same as [`crate::spy`].
    pub fn spy<A: Clone + 'static>(&self) -> Spy<A> {
        Spy::new()
    }

    /// Run every test and report with [`DefaultReporter`]. Returns the number
    /// of failures (0 means everything passed).
    pub fn run(&self) -> usize {
        self.run_with(DefaultReporter)
    }

    /// Run every test and hand the outcomes to `reporter`.
    pub fn run_with(&self, reporter: impl Reporter) -> usize {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("ospec: failed to start the scheduler runtime");
        let outcomes = LocalSet::new().block_on(&runtime, self.run_async());
        reporter.report(&outcomes)
    }

    /// Run every test from inside the caller's event loop and return the
    /// ordered outcomes. Must be polled within a [`LocalSet`] on a runtime
    /// with timers enabled.
    pub async fn run_async(&self) -> Vec<Outcome> {
        let root = self.with_builder(|b| b.take_root());
        let exclusive = root.has_only();
        tracing::debug!(tests = root.test_count(), exclusive, "starting run");

        let sink = Sink::default();
        self.inner.running.set(true);
        Scheduler::new(
            sink.clone(),
            exclusive,
            self.inner.config.default_timeout,
            &self.inner.current,
        )
        .run(&root)
        .await;
        self.inner.running.set(false);
        self.inner.builder.borrow_mut().restore_root(root);

        if exclusive && self.inner.config.fail_on_only {
            let message = format!(
                "`only` tests are present and {} is set",
                RunConfig::FAIL_ON_ONLY_VAR
            );
            sink.borrow_mut()
                .push(Rc::new(RefCell::new(Outcome::failure("(only)", message, None))));
        }

        let outcomes: Vec<Outcome> = sink.borrow().iter().map(|o| o.borrow().clone()).collect();
        tracing::debug!(outcomes = outcomes.len(), "run finished");
        outcomes
    }
}
