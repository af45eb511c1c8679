// Deferred computations and their completion cells.
// A Deferred is inert until started; every start launches one run whose outcome fans out to observers.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{Instrument, Span};

use crate::cache::Cached;
use crate::error::FetchError;

use super::FetchOutcome;

type Observer<T> = Box<dyn FnOnce(&FetchOutcome<T>) + Send>;
type Work<T> = Arc<dyn Fn() -> BoxFuture<'static, FetchOutcome<T>> + Send + Sync>;

enum Slot<T> {
    Waiting(Vec<Observer<T>>),
    // Outcome stored, earlier observers still being called. Late attachers queue here.
    Notifying(FetchOutcome<T>, Vec<Observer<T>>),
    Done(FetchOutcome<T>),
}

struct PendingInner<T> {
    slot: Mutex<Slot<T>>,
    launched: AtomicBool,
}

/// One-shot completion cell for a single started run.
///
/// Observers are called in attachment order once the outcome arrives, including
/// ones attached while earlier observers are still running. Observers attached
/// after every queued observer has run are called immediately. A panicking
/// observer is logged and does not stop the others.
pub struct Pending<T> {
    inner: Arc<PendingInner<T>>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Pending<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(PendingInner {
                slot: Mutex::new(Slot::Waiting(Vec::new())),
                launched: AtomicBool::new(false),
            }),
        }
    }

    /// A cell that is already complete.
    pub(crate) fn resolved(outcome: FetchOutcome<T>) -> Self {
        Self {
            inner: Arc::new(PendingInner {
                slot: Mutex::new(Slot::Done(outcome)),
                launched: AtomicBool::new(true),
            }),
        }
    }

    /// Attach a completion observer.
    pub fn on_complete<F>(&self, observer: F)
    where
        F: FnOnce(&FetchOutcome<T>) + Send + 'static,
    {
        let mut slot = self.inner.slot.lock();
        match &mut *slot {
            Slot::Waiting(observers) | Slot::Notifying(_, observers) => {
                observers.push(Box::new(observer))
            }
            Slot::Done(outcome) => {
                let outcome = outcome.clone();
                drop(slot);
                notify(observer, &outcome);
            }
        }
    }

    /// The outcome, if the run has completed.
    pub fn outcome(&self) -> Option<FetchOutcome<T>> {
        match &*self.inner.slot.lock() {
            Slot::Notifying(outcome, _) | Slot::Done(outcome) => Some(outcome.clone()),
            Slot::Waiting(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(&*self.inner.slot.lock(), Slot::Waiting(_))
    }

    /// Single-fire start barrier. Returns true for the first caller only.
    fn try_launch(&self) -> bool {
        !self.inner.launched.swap(true, Ordering::AcqRel)
    }

    /// Store the outcome and notify waiting observers. Only the first call has effect.
    pub(crate) fn complete(&self, outcome: FetchOutcome<T>) {
        let mut batch = {
            let mut slot = self.inner.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Notifying(outcome.clone(), Vec::new())) {
                Slot::Waiting(observers) => observers,
                earlier => {
                    *slot = earlier;
                    return;
                }
            }
        };

        loop {
            for observer in batch {
                notify(observer, &outcome);
            }

            let mut slot = self.inner.slot.lock();
            let queued = match &mut *slot {
                Slot::Notifying(_, queued) => std::mem::take(queued),
                _ => Vec::new(),
            };
            if queued.is_empty() {
                *slot = Slot::Done(outcome);
                return;
            }
            batch = queued;
        }
    }
}

fn notify<T, F>(observer: F, outcome: &FetchOutcome<T>)
where
    F: FnOnce(&FetchOutcome<T>),
{
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| observer(outcome))) {
        tracing::error!(panic = %panic_message(&*panic), "completion observer panicked");
    }
}

/// Something that yields a completion cell when started.
pub trait Computation: Send + Sync {
    type Output: Clone + Send + 'static;

    /// Start (or join) a run and return its completion cell.
    fn start(&self) -> Pending<Self::Output>;

    /// Start and attach a non-blocking observer.
    fn subscribe<F>(&self, observer: F)
    where
        F: FnOnce(&FetchOutcome<Self::Output>) + Send + 'static,
        Self: Sized,
    {
        self.start().on_complete(observer);
    }
}

/// Cold computation: building it does nothing, each start performs the work once.
pub struct Deferred<T> {
    work: Work<T>,
    runtime: Handle,
    span: Span,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            work: Arc::clone(&self.work),
            runtime: self.runtime.clone(),
            span: self.span.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Wrap `work`. It is not called until the computation is started.
    pub fn new<F, Fut>(runtime: Handle, work: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchOutcome<T>> + Send + 'static,
    {
        Self {
            work: Arc::new(move || work().boxed()),
            runtime,
            span: Span::current(),
        }
    }

    /// Log context for runs of this computation.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Wrap this computation in a TTL cache. Each call creates a new,
    /// independent cache instance.
    pub fn cache(&self, ttl: Duration) -> Cached<T> {
        Cached::new(self.clone(), ttl)
    }

    /// Run the work for `pending` on the worker pool, unless it already ran.
    pub(crate) fn launch(&self, pending: &Pending<T>) {
        if !pending.try_launch() {
            return;
        }

        let work = Arc::clone(&self.work);
        let pending = pending.clone();
        self.runtime.spawn(
            async move {
                let outcome = AssertUnwindSafe(async move { work().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(FetchError::Aborted(panic_message(&*panic))));
                if let Err(err) = &outcome {
                    tracing::debug!(error = %err, "run failed");
                }
                pending.complete(outcome);
            }
            .instrument(self.span.clone()),
        );
    }
}

impl<T: Clone + Send + 'static> Computation for Deferred<T> {
    type Output = T;

    fn start(&self) -> Pending<T> {
        let pending = Pending::new();
        self.launch(&pending);
        pending
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
