// Fetch pipeline module.
// Deferred runs, status classification, bounded resolution, and fire-and-observe subscriptions.

pub mod classify;
pub mod deferred;
pub mod observe;
pub mod resolver;

pub use classify::{StatusClassifier, StatusRule};
pub use deferred::{Computation, Deferred, Pending};
pub use observe::observe_into;
pub use resolver::{BoundedResolver, DEFAULT_DEADLINE, ResolveState};

/// Result of one fetch attempt, shared by every observer of that attempt.
pub type FetchOutcome<T> = crate::error::Result<T>;
