// Bounded resolution of computations.
// Waits for an outcome up to a deadline, from either a plain thread or an async task.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::FetchError;

use super::{Computation, FetchOutcome};

/// Default deadline for bounded resolves: 100 seconds.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(100);

/// Lifecycle of a single resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    NotStarted,
    Pending,
    Resolved,
    TimedOut,
}

impl ResolveState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolveState::Resolved | ResolveState::TimedOut)
    }
}

/// Turns a computation into a value within an optional deadline.
///
/// A timeout abandons only the wait. The underlying run keeps going, still
/// notifies its other observers, and still fills any cache wrapping it.
/// Once terminal, the resolver keeps returning the same outcome.
#[derive(Debug)]
pub struct BoundedResolver<T> {
    deadline: Option<Duration>,
    state: ResolveState,
    outcome: Option<FetchOutcome<T>>,
}

impl<T: Clone + Send + 'static> BoundedResolver<T> {
    /// `None` waits without bound.
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline,
            state: ResolveState::NotStarted,
            outcome: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn state(&self) -> ResolveState {
        self.state
    }

    /// Block the calling thread until the computation resolves or the deadline passes.
    ///
    /// Must not be called from inside an async task: the wait parks the thread.
    pub fn block<C>(&mut self, computation: &C) -> FetchOutcome<T>
    where
        C: Computation<Output = T>,
    {
        if self.state.is_terminal() {
            if let Some(outcome) = &self.outcome {
                return outcome.clone();
            }
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.state = ResolveState::Pending;
        computation.subscribe(move |outcome| {
            let _ = tx.send(outcome.clone());
        });

        let received = match self.deadline {
            Some(deadline) => rx.recv_timeout(deadline).map_err(|err| match err {
                RecvTimeoutError::Timeout => FetchError::DeadlineExceeded(deadline),
                RecvTimeoutError::Disconnected => dropped(),
            }),
            None => rx.recv().map_err(|_| dropped()),
        };

        self.finish(received)
    }

    /// Await the computation, giving up once the deadline passes.
    pub async fn resolve<C>(&mut self, computation: &C) -> FetchOutcome<T>
    where
        C: Computation<Output = T>,
    {
        if self.state.is_terminal() {
            if let Some(outcome) = &self.outcome {
                return outcome.clone();
            }
        }

        let (tx, rx) = oneshot::channel();
        self.state = ResolveState::Pending;
        computation.subscribe(move |outcome| {
            let _ = tx.send(outcome.clone());
        });

        let received = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(result) => result.map_err(|_| dropped()),
                Err(_) => Err(FetchError::DeadlineExceeded(deadline)),
            },
            None => rx.await.map_err(|_| dropped()),
        };

        self.finish(received)
    }

    fn finish(&mut self, received: Result<FetchOutcome<T>, FetchError>) -> FetchOutcome<T> {
        let outcome = match received {
            Ok(outcome) => {
                self.state = ResolveState::Resolved;
                outcome
            }
            Err(err @ FetchError::DeadlineExceeded(_)) => {
                tracing::warn!(
                    deadline_ms = self.deadline.map(|d| d.as_millis() as u64),
                    "deadline exceeded; request left running"
                );
                self.state = ResolveState::TimedOut;
                Err(err)
            }
            Err(err) => {
                self.state = ResolveState::Resolved;
                Err(err)
            }
        };

        self.outcome = Some(outcome.clone());
        outcome
    }
}

fn dropped() -> FetchError {
    FetchError::Aborted("computation dropped before completing".to_string())
}
