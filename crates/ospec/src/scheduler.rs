//! Sequential, depth-first execution of a spec tree.
//!
//! ```text
//! spec
//!   before (once)
//!   for each test: before_each (outer → inner) → body → after_each (inner → outer)
//!   nested specs, in declaration order
//!   after (once)
//! ```
//!
//! Exactly one invocation is current at a time; the next one starts only
//! once the previous one settled or timed out.

use crate::assert::Outcome;
use crate::builder::{Child, HookKind, SpecNode, TestCase};
use crate::context::{drive, Definer, Invocation, Sink};
use crate::error::TestError;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// A spec on the path from the root to the node being run, with the timeout
/// in effect for its hooks.
#[derive(Clone, Copy)]
struct Frame<'t> {
    node: &'t SpecNode,
    timeout: Duration,
}

pub(crate) struct Scheduler<'a> {
    sink: Sink,
    exclusive: bool,
    default_timeout: Duration,
    current: &'a RefCell<Weak<Invocation>>,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        sink: Sink,
        exclusive: bool,
        default_timeout: Duration,
        current: &'a RefCell<Weak<Invocation>>,
    ) -> Self {
        Scheduler {
            sink,
            exclusive,
            default_timeout,
            current,
        }
    }

    pub(crate) async fn run(&self, root: &SpecNode) {
        self.run_spec(root, Vec::new(), Vec::new(), self.default_timeout)
            .await;
    }

    fn run_spec<'t>(
        &'t self,
        node: &'t SpecNode,
        path: Vec<&'t str>,
        ancestors: Vec<Frame<'t>>,
        inherited: Duration,
    ) -> LocalBoxFuture<'t, ()> {
        async move {
            if self.exclusive && !node.has_only() {
                tracing::debug!(spec = %path.join(" "), "skipping spec without `only` tests");
                return;
            }

            let timeout = node.spec_timeout.unwrap_or(inherited);
            let mut frames = ancestors;
            frames.push(Frame { node, timeout });

            let ready = self
                .run_once_hooks(&node.before, HookKind::Before, &path, timeout)
                .await;
            if ready {
                for child in &node.children {
                    match child {
                        Child::Test(test) => self.run_test(test, &path, &frames, timeout).await,
                        Child::Spec(spec) => {
                            let mut child_path = path.clone();
                            child_path.push(&spec.name);
                            self.run_spec(spec, child_path, frames.clone(), timeout)
                                .await;
                        }
                    }
                }
            }
            self.run_once_hooks(&node.after, HookKind::After, &path, timeout)
                .await;
        }
        .boxed_local()
    }

    /// Run `before` or `after` hooks. Stops at the first failure and returns
    /// whether all of them succeeded.
    async fn run_once_hooks(
        &self,
        hooks: &[Definer],
        kind: HookKind,
        path: &[&str],
        timeout: Duration,
    ) -> bool {
        if hooks.is_empty() {
            return true;
        }
        let context = hook_context(path, kind);
        for hook in hooks {
            if let Err(err) = self.invoke(hook, &context, timeout).await {
                self.hook_failed(&context, kind, err);
                return false;
            }
        }
        true
    }

    async fn run_test(
        &self,
        test: &TestCase,
        path: &[&str],
        frames: &[Frame<'_>],
        inherited: Duration,
    ) {
        if self.exclusive && !test.only {
            return;
        }

        let context = test_context(path, &test.name);
        let timeout = test.timeout.unwrap_or(inherited);
        tracing::debug!(test = %context, timeout_ms = timeout.as_millis() as u64, "running test");

        let mut ready = true;
        'setup: for frame in frames {
            for hook in &frame.node.before_each {
                if let Err(err) = self.invoke(hook, &context, frame.timeout).await {
                    self.hook_failed(&context, HookKind::BeforeEach, err);
                    ready = false;
                    break 'setup;
                }
            }
        }

        if ready {
            if let Err(err) = self.invoke(&test.body, &context, timeout).await {
                if err.is_timeout() {
                    tracing::warn!(test = %context, "{err}");
                }
                let message = err.to_string();
                self.push(Outcome::failure(&context, message, Some(err)));
            }
        }

        for frame in frames.iter().rev() {
            for hook in &frame.node.after_each {
                if let Err(err) = self.invoke(hook, &context, frame.timeout).await {
                    self.hook_failed(&context, HookKind::AfterEach, err);
                }
            }
        }
    }

    async fn invoke(&self, body: &Definer, context: &str, timeout: Duration) -> Result<(), TestError> {
        let (invocation, signal) = Invocation::start(context.to_string(), self.sink.clone(), timeout);
        *self.current.borrow_mut() = Rc::downgrade(&invocation);
        let settled = drive(body, &invocation, signal).await;
        invocation.close();
        *self.current.borrow_mut() = Weak::new();
        settled
    }

    fn hook_failed(&self, context: &str, kind: HookKind, err: TestError) {
        tracing::warn!(context = %context, hook = kind.label(), error = %err, "hook failed");
        let message = format!("{} hook failed: {err}", kind.label());
        self.push(Outcome::failure(context, message, Some(err)));
    }

    fn push(&self, outcome: Outcome) {
        self.sink.borrow_mut().push(Rc::new(RefCell::new(outcome)));
    }
}

fn test_context(path: &[&str], name: &str) -> String {
    let mut parts = path.to_vec();
    parts.push(name);
    parts.join(" ")
}

fn hook_context(path: &[&str], kind: HookKind) -> String {
    let label = format!("({})", kind.label());
    if path.is_empty() {
        label
    } else {
        format!("{} {label}", path.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_joins_path_with_spaces() {
        assert_eq!(test_context(&["math"], "add"), "math add");
        assert_eq!(test_context(&[], "top"), "top");
        assert_eq!(test_context(&["a", "b"], "c"), "a b c");
    }

    #[test]
    fn test_hook_context_marks_hook() {
        assert_eq!(hook_context(&["math"], HookKind::Before), "math (before)");
        assert_eq!(hook_context(&[], HookKind::After), "(after)");
    }
}
