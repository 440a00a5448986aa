//! Spec tree and the build-phase API (`spec`, `test`, `only`, hooks).

use crate::context::{definer, Context, Definer, IntoCompletion};
use crate::runtime::Ospec;
use std::time::Duration;

// ============================================================================
// Spec tree
// ============================================================================

pub(crate) struct SpecNode {
    pub(crate) name: String,
    pub(crate) before: Vec<Definer>,
    pub(crate) after: Vec<Definer>,
    pub(crate) before_each: Vec<Definer>,
    pub(crate) after_each: Vec<Definer>,
    pub(crate) spec_timeout: Option<Duration>,
    pub(crate) children: Vec<Child>,
}

pub(crate) enum Child {
    Spec(SpecNode),
    Test(TestCase),
}

pub(crate) struct TestCase {
    pub(crate) name: String,
    pub(crate) body: Definer,
    pub(crate) timeout: Option<Duration>,
    pub(crate) only: bool,
}

impl SpecNode {
    fn new(name: String) -> Self {
        SpecNode {
            name,
            before: Vec::new(),
            after: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            spec_timeout: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn root() -> Self {
        SpecNode::new(String::new())
    }

    /// Whether any test at or below this node is marked `only`.
    pub(crate) fn has_only(&self) -> bool {
        self.children.iter().any(|child| match child {
            Child::Test(test) => test.only,
            Child::Spec(spec) => spec.has_only(),
        })
    }

    pub(crate) fn test_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Child::Test(_) => 1,
                Child::Spec(spec) => spec.test_count(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    Before,
    After,
    BeforeEach,
    AfterEach,
}

impl HookKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            HookKind::Before => "before",
            HookKind::After => "after",
            HookKind::BeforeEach => "before_each",
            HookKind::AfterEach => "after_each",
        }
    }
}

// ============================================================================
// Build stack — the "currently building" node of one instance
// ============================================================================

pub(crate) struct SuiteBuilder {
    stack: Vec<SpecNode>,
}

impl SuiteBuilder {
    pub(crate) fn new() -> Self {
        SuiteBuilder {
            stack: vec![SpecNode::root()],
        }
    }

    fn push_spec(&mut self, name: String) {
        self.stack.push(SpecNode::new(name));
    }

    fn pop_spec(&mut self) {
        assert!(self.stack.len() > 1, "ospec: unbalanced spec push/pop");
        if let Some(node) = self.stack.pop() {
            self.current_mut().children.push(Child::Spec(node));
        }
    }

    fn add_test(&mut self, test: TestCase) {
        self.current_mut().children.push(Child::Test(test));
    }

    fn add_hook(&mut self, kind: HookKind, hook: Definer) {
        let node = self.current_mut();
        match kind {
            HookKind::Before => node.before.push(hook),
            HookKind::After => node.after.push(hook),
            HookKind::BeforeEach => node.before_each.push(hook),
            HookKind::AfterEach => node.after_each.push(hook),
        }
    }

    fn set_spec_timeout(&mut self, timeout: Duration) {
        self.current_mut().spec_timeout = Some(timeout);
    }

    fn current_mut(&mut self) -> &mut SpecNode {
        self.stack.last_mut().expect("ospec: empty builder stack")
    }

    /// Hand the finished tree to the scheduler, leaving an empty root behind.
    pub(crate) fn take_root(&mut self) -> SpecNode {
        assert_eq!(
            self.stack.len(),
            1,
            "ospec: run() called while a spec is still being built"
        );
        std::mem::replace(&mut self.stack[0], SpecNode::root())
    }

    pub(crate) fn restore_root(&mut self, root: SpecNode) {
        self.stack[0] = root;
    }
}

// ============================================================================
// Build API on the runtime instance
// ============================================================================

impl Ospec {
    /// Define a group of tests. `body` runs immediately to register them.
    ///
    /// ```rust,no_run
    /// let o = ospec::Ospec::new();
    /// o.spec("math", |o| {
    ///     o.test("add", |cx| {
    ///         cx.o(1 + 1).equals(2);
    ///     });
    /// });
    /// ```
    pub fn spec(&self, name: &str, body: impl FnOnce(&Ospec)) {
        self.with_builder(|b| b.push_spec(name.to_string()));
        body(self);
        self.with_builder(|b| b.pop_spec());
    }

    /// Define a test. Registered when the returned [`TestBuilder`] drops.
    pub fn test<F, R>(&self, name: &str, body: F) -> TestBuilder<'_>
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        TestBuilder::new(self, name, definer(body), false)
    }

    /// Define a test and switch this instance to exclusive mode: only `only`
    /// tests (and the hooks of specs containing them) run.
    pub fn only<F, R>(&self, name: &str, body: F) -> TestBuilder<'_>
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        TestBuilder::new(self, name, definer(body), true)
    }

    /// Run once before the first test of the current spec.
    pub fn before<F, R>(&self, hook: F)
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        self.add_hook(HookKind::Before, definer(hook));
    }

    /// Run once after everything in the current spec.
    pub fn after<F, R>(&self, hook: F)
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        self.add_hook(HookKind::After, definer(hook));
    }

    /// Run before every test at or below the current spec.
    pub fn before_each<F, R>(&self, hook: F)
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        self.add_hook(HookKind::BeforeEach, definer(hook));
    }

    /// Run after every test at or below the current spec.
    pub fn after_each<F, R>(&self, hook: F)
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        self.add_hook(HookKind::AfterEach, definer(hook));
    }

    /// Default timeout for tests and hooks in the current spec and below.
    pub fn spec_timeout(&self, ms: u64) {
        self.with_builder(|b| b.set_spec_timeout(Duration::from_millis(ms)));
    }

    fn add_hook(&self, kind: HookKind, hook: Definer) {
        self.with_builder(|b| b.add_hook(kind, hook));
    }
}

// ============================================================================
// TestBuilder — registers the test on Drop
// ============================================================================

/// Returned by [`Ospec::test`] and [`Ospec::only`]. Registers the test when
/// dropped, so decorators can be chained:
///
/// ```rust,no_run
/// # let o = ospec::Ospec::new();
/// o.test("slow", |cx| {
///     cx.o(true).equals(true);
/// })
/// .timeout(500);
/// ```
pub struct TestBuilder<'a> {
    ospec: &'a Ospec,
    name: String,
    body: Option<Definer>,
    only: bool,
    timeout: Option<Duration>,
}

impl<'a> TestBuilder<'a> {
    fn new(ospec: &'a Ospec, name: &str, body: Definer, only: bool) -> Self {
        TestBuilder {
            ospec,
            name: name.to_string(),
            body: Some(body),
            only,
            timeout: None,
        }
    }

    /// Own timeout, taking precedence over any `spec_timeout`.
    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(ms));
        self
    }
}

impl Drop for TestBuilder<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if let Some(body) = self.body.take() {
            let test = TestCase {
                name: std::mem::take(&mut self.name),
                body,
                timeout: self.timeout,
                only: self.only,
            };
            self.ospec.with_builder(|b| b.add_test(test));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(node: &SpecNode) -> Vec<String> {
        node.children
            .iter()
            .map(|child| match child {
                Child::Spec(spec) => format!("spec:{}", spec.name),
                Child::Test(test) => format!("test:{}", test.name),
            })
            .collect()
    }

    #[test]
    fn test_builds_nested_tree_in_declaration_order() {
        let o = Ospec::new();
        o.test("first", |_| ());
        o.spec("group", |o| {
            o.spec_timeout(100);
            o.before_each(|_| ());
            o.test("inner", |_| ()).timeout(5);
        });
        o.test("last", |_| ());

        let root = o.inner().builder.borrow_mut().take_root();
        assert_eq!(names(&root), vec!["test:first", "spec:group", "test:last"]);
        assert_eq!(root.test_count(), 3);
        assert!(!root.has_only());

        let Child::Spec(group) = &root.children[1] else {
            panic!("expected a spec");
        };
        assert_eq!(group.spec_timeout, Some(Duration::from_millis(100)));
        assert_eq!(group.before_each.len(), 1);
        let Child::Test(inner) = &group.children[0] else {
            panic!("expected a test");
        };
        assert_eq!(inner.timeout, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_only_marks_ancestors() {
        let o = Ospec::new();
        o.spec("a", |o| {
            o.spec("b", |o| {
                o.only("focused", |_| ());
            });
        });
        o.spec("c", |o| {
            o.test("plain", |_| ());
        });
        let root = o.inner().builder.borrow_mut().take_root();
        assert!(root.has_only());
        let flags: Vec<bool> = root
            .children
            .iter()
            .map(|child| match child {
                Child::Spec(spec) => spec.has_only(),
                Child::Test(test) => test.only,
            })
            .collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn test_instances_do_not_share_trees() {
        let a = Ospec::new();
        let b = Ospec::new();
        a.only("only in a", |_| ());
        b.test("plain in b", |_| ());
        assert!(a.inner().builder.borrow_mut().take_root().has_only());
        let root_b = b.inner().builder.borrow_mut().take_root();
        assert!(!root_b.has_only());
        assert_eq!(root_b.test_count(), 1);
    }

    #[test]
    #[should_panic(expected = "ospec: run() called while a spec is still being built")]
    fn test_take_root_rejects_open_spec() {
        let mut builder = SuiteBuilder::new();
        builder.push_spec("open".to_string());
        builder.take_root();
    }

    #[test]
    fn test_hook_labels() {
        let labels: Vec<&str> = [
            HookKind::Before,
            HookKind::After,
            HookKind::BeforeEach,
            HookKind::AfterEach,
        ]
        .into_iter()
        .map(HookKind::label)
        .collect();
        assert_eq!(labels, vec!["before", "after", "before_each", "after_each"]);
    }
}
