//! Execution context handed to test bodies and hooks, and the completion
//! protocol that decides when a body has finished.
//!
//! A body completes at the first of:
//!
//! - returning without having called [`Context::defer`] (`Err` fails it);
//! - the [`Done`] handle from `defer` being signalled;
//! - a future returned through [`Completion::future`] resolving;
//! - its deadline passing.
//!
//! Later signals, and assertions made through a stale `Context`, are dropped.

use crate::assert::{Assertion, Describer, Outcome};
use crate::error::{panic_message, AssertionError, TestError};
use crate::value::Value;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Ordered outcome sequence of one run.
pub(crate) type Sink = Rc<RefCell<Vec<Rc<RefCell<Outcome>>>>>;

type Settled = Result<(), TestError>;

/// Body of a test or hook.
pub(crate) type Definer = Box<dyn Fn(Context) -> Completion>;

pub(crate) fn definer<F, R>(body: F) -> Definer
where
    F: Fn(Context) -> R + 'static,
    R: IntoCompletion,
{
    Box::new(move |cx| body(cx).into_completion())
}

// ============================================================================
// Invocation — one execution of one definer
// ============================================================================

pub(crate) struct Invocation {
    context: String,
    sink: Sink,
    open: Cell<bool>,
    deferred: Cell<bool>,
    signal: RefCell<Option<oneshot::Sender<Settled>>>,
    timeout: Cell<Duration>,
    deadline: Cell<Instant>,
    /// Wakes the waiting scheduler when the deadline moves.
    rearm: Notify,
}

impl Invocation {
    pub(crate) fn start(
        context: String,
        sink: Sink,
        timeout: Duration,
    ) -> (Rc<Invocation>, oneshot::Receiver<Settled>) {
        let (tx, rx) = oneshot::channel();
        let invocation = Rc::new(Invocation {
            context,
            sink,
            open: Cell::new(true),
            deferred: Cell::new(false),
            signal: RefCell::new(Some(tx)),
            timeout: Cell::new(timeout),
            deadline: Cell::new(Instant::now() + timeout),
            rearm: Notify::new(),
        });
        (invocation, rx)
    }

    /// An open invocation with its own sink, outside any scheduler.
    #[cfg(test)]
    pub(crate) fn detached(context: &str) -> Rc<Invocation> {
        Invocation::start(context.to_string(), Sink::default(), Duration::from_secs(1)).0
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> &Sink {
        &self.sink
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }

    pub(crate) fn record(&self, pass: Option<bool>, error: Option<AssertionError>) -> Describer {
        let message = error.as_ref().map(ToString::to_string).unwrap_or_default();
        let outcome = Rc::new(RefCell::new(Outcome {
            pass,
            context: self.context.clone(),
            message,
            error,
            test_error: None,
        }));
        if self.open.get() {
            self.sink.borrow_mut().push(outcome.clone());
        } else {
            tracing::trace!(context = %self.context, "dropping assertion from a finished test");
        }
        Describer::new(outcome)
    }

    fn settle(&self, result: Settled) {
        if !self.open.get() {
            tracing::trace!(context = %self.context, "ignoring completion of a finished test");
            return;
        }
        if let Some(tx) = self.signal.borrow_mut().take() {
            // The receiver only goes away once the invocation is closed.
            let _ = tx.send(result);
        }
    }

    /// Re-arm the deadline `timeout` from now.
    pub(crate) fn set_timeout(&self, timeout: Duration) {
        if self.open.get() {
            self.timeout.set(timeout);
            self.deadline.set(Instant::now() + timeout);
            self.rearm.notify_one();
        }
    }

    pub(crate) fn close(&self) {
        self.open.set(false);
        self.signal.borrow_mut().take();
    }
}

// ============================================================================
// Context / Done — the user-facing handles
// ============================================================================

/// Handle passed to every test body and hook.
///
/// Cheap to clone; clones can be moved into spawned tasks. Once the
/// invocation it belongs to has finished, everything done through it is
/// silently ignored.
#[derive(Clone)]
pub struct Context {
    invocation: Rc<Invocation>,
}

impl Context {
    /// Start an assertion chain on `actual`.
    pub fn o(&self, actual: impl Into<Value>) -> Assertion {
        Assertion::new(self.invocation.clone(), actual.into())
    }

    /// Switch this body to explicit completion: it finishes when the returned
    /// [`Done`] is signalled (or the deadline passes).
    pub fn defer(&self) -> Done {
        self.invocation.deferred.set(true);
        Done {
            invocation: self.invocation.clone(),
        }
    }

    /// Override the deadline: the body now has `ms` milliseconds from this call.
    pub fn timeout(&self, ms: u64) {
        self.invocation.set_timeout(Duration::from_millis(ms));
    }

    /// Context string outcomes of this invocation are recorded under.
    pub fn context(&self) -> &str {
        &self.invocation.context
    }

    pub(crate) fn new(invocation: Rc<Invocation>) -> Self {
        Context { invocation }
    }
}

/// Completion signal obtained from [`Context::defer`]. Consumed on use; the
/// first signal for an invocation wins.
pub struct Done {
    invocation: Rc<Invocation>,
}

impl Done {
    pub fn done(self) {
        self.invocation.settle(Ok(()));
    }

    pub fn fail(self, error: impl Into<TestError>) {
        self.invocation.settle(Err(error.into()));
    }

    /// Complete with an optional error, `None` meaning success.
    pub fn finish<E: Into<TestError>>(self, error: Option<E>) {
        self.invocation.settle(error.map_or(Ok(()), |e| Err(e.into())));
    }
}

// ============================================================================
// Completion — what a body returns
// ============================================================================

/// How a body reports completion when it returns.
pub struct Completion {
    kind: CompletionKind,
}

enum CompletionKind {
    Returned,
    Failed(TestError),
    Future(LocalBoxFuture<'static, Settled>),
}

impl Completion {
    /// Complete when `fut` resolves. It runs as a task on the scheduler's
    /// `LocalSet`, so it keeps running (detached) if the body times out.
    ///
    /// ```rust,no_run
    /// use ospec::Completion;
    /// use std::time::Duration;
    ///
    /// let o = ospec::Ospec::new();
    /// o.test("waits", |cx| {
    ///     Completion::future(async move {
    ///         tokio::time::sleep(Duration::from_millis(5)).await;
    ///         cx.o(true).equals(true);
    ///     })
    /// });
    /// ```
    pub fn future<F>(fut: F) -> Self
    where
        F: Future + 'static,
        F::Output: Settlement,
    {
        Completion {
            kind: CompletionKind::Future(async move { fut.await.into_settlement() }.boxed_local()),
        }
    }

    pub fn failed(error: impl Into<TestError>) -> Self {
        Completion {
            kind: CompletionKind::Failed(error.into()),
        }
    }
}

/// Outputs a body's future may resolve to.
pub trait Settlement {
    fn into_settlement(self) -> Result<(), TestError>;
}

impl Settlement for () {
    fn into_settlement(self) -> Result<(), TestError> {
        Ok(())
    }
}

impl<E: Into<TestError>> Settlement for Result<(), E> {
    fn into_settlement(self) -> Result<(), TestError> {
        self.map_err(Into::into)
    }
}

/// Return types accepted from a body.
pub trait IntoCompletion {
    fn into_completion(self) -> Completion;
}

impl IntoCompletion for Completion {
    fn into_completion(self) -> Completion {
        self
    }
}

impl IntoCompletion for () {
    fn into_completion(self) -> Completion {
        Completion {
            kind: CompletionKind::Returned,
        }
    }
}

impl<E: Into<TestError>> IntoCompletion for Result<(), E> {
    fn into_completion(self) -> Completion {
        match self {
            Ok(()) => ().into_completion(),
            Err(e) => Completion::failed(e),
        }
    }
}

// ============================================================================
// Driving one invocation to completion
// ============================================================================

/// Run `body` under `invocation` and wait for the first completion path.
/// Must be polled inside a `LocalSet`.
pub(crate) async fn drive(
    body: &Definer,
    invocation: &Rc<Invocation>,
    mut signal: oneshot::Receiver<Settled>,
) -> Settled {
    let cx = Context::new(invocation.clone());
    let completion = match catch_unwind(AssertUnwindSafe(|| body(cx))) {
        Ok(completion) => completion,
        Err(payload) => return Err(TestError::Panic(panic_message(&*payload))),
    };

    // `done` called synchronously beats whatever the body returned.
    if let Ok(settled) = signal.try_recv() {
        return settled;
    }

    let task = match completion.kind {
        CompletionKind::Returned if !invocation.deferred.get() => return Ok(()),
        CompletionKind::Returned => None,
        CompletionKind::Failed(err) => return Err(err),
        CompletionKind::Future(fut) => Some(tokio::task::spawn_local(fut)),
    };
    wait(invocation, signal, task).await
}

async fn wait(
    invocation: &Invocation,
    mut signal: oneshot::Receiver<Settled>,
    mut task: Option<JoinHandle<Settled>>,
) -> Settled {
    loop {
        let deadline = invocation.deadline.get();
        let joined = async {
            match task.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            settled = &mut signal => return settled.unwrap_or(Ok(())),
            _ = invocation.rearm.notified() => continue,
            joined = joined => {
                return joined.unwrap_or_else(|err| {
                    if err.is_panic() {
                        Err(TestError::Panic(panic_message(&*err.into_panic())))
                    } else {
                        Err(TestError::Panic("task was cancelled".to_string()))
                    }
                });
            }
            _ = tokio::time::sleep_until(deadline) => {
                // The deadline may have been pushed back while we slept.
                if Instant::now() >= invocation.deadline.get() {
                    let ms = invocation.timeout.get().as_millis() as u64;
                    return Err(TestError::Timeout { ms });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn block_on<F: Future>(fut: F) -> F::Output {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        LocalSet::new().block_on(&rt, fut)
    }

    fn run_body<F, R>(body: F, timeout_ms: u64) -> (Settled, Rc<Invocation>)
    where
        F: Fn(Context) -> R + 'static,
        R: IntoCompletion,
    {
        let body = definer(body);
        let (invocation, rx) = Invocation::start(
            "ctx".to_string(),
            Sink::default(),
            Duration::from_millis(timeout_ms),
        );
        let settled = block_on(drive(&body, &invocation, rx));
        invocation.close();
        (settled, invocation)
    }

    #[test]
    fn test_plain_return_completes_immediately() {
        let (settled, _) = run_body(|_| (), 10);
        assert!(settled.is_ok());
    }

    #[test]
    fn test_returned_error_fails() {
        let (settled, _) = run_body(|_| Err::<(), _>("nope"), 10);
        assert_eq!(settled.unwrap_err().message(), "nope");
    }

    #[test]
    fn test_sync_done_wins_over_return_value() {
        let (settled, _) = run_body(
            |cx| {
                cx.defer().fail("first");
                Err::<(), _>("second")
            },
            10,
        );
        assert_eq!(settled.unwrap_err().message(), "first");
    }

    #[test]
    fn test_deferred_without_signal_times_out() {
        let (settled, _) = run_body(
            |cx| {
                let _done = cx.defer();
            },
            10,
        );
        assert!(matches!(settled, Err(TestError::Timeout { ms: 10 })));
    }

    #[test]
    fn test_timeout_override_extends_deadline() {
        let (settled, _) = run_body(
            |cx| {
                cx.timeout(200);
                Completion::future(async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                })
            },
            10,
        );
        assert!(settled.is_ok());
    }

    #[test]
    fn test_timeout_override_shortens_deadline_while_waiting() {
        let started = Instant::now();
        let (settled, _) = run_body(
            |cx| {
                Completion::future(async move {
                    tokio::task::yield_now().await;
                    cx.timeout(10);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                })
            },
            400,
        );
        assert!(matches!(settled, Err(TestError::Timeout { ms: 10 })));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_future_panic_is_a_test_error() {
        let (settled, _) = run_body(
            |_| {
                Completion::future(async {
                    panic!("inside future");
                    #[allow(unreachable_code)]
                    ()
                })
            },
            100,
        );
        assert!(matches!(settled, Err(TestError::Panic(msg)) if msg == "inside future"));
    }

    #[test]
    fn test_body_panic_is_a_test_error() {
        let (settled, _) = run_body::<_, ()>(
            |_| {
                panic!("sync");
            },
            10,
        );
        assert!(matches!(settled, Err(TestError::Panic(msg)) if msg == "sync"));
    }

    #[test]
    fn test_closed_invocation_drops_assertions() {
        let invocation = Invocation::detached("closed");
        let cx = Context::new(invocation.clone());
        cx.o(1).equals(1);
        invocation.close();
        cx.o(2).equals(2).describe("late");
        assert_eq!(invocation.sink().borrow().len(), 1);
        assert!(!invocation.is_open());
    }
}
