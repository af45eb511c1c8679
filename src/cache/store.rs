// TTL cache wrapper for deferred computations.
// Remembers one resolved outcome per wrapped instance until its window expires.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::pipeline::{Computation, Deferred, FetchOutcome, Pending};

/// Default cache window for resolved outcomes: 15 seconds.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

// Expiry used when `cached_at + ttl` does not fit in an Instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A resolved outcome with its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached outcome, success or failure.
    pub outcome: FetchOutcome<T>,
    /// When the underlying run resolved.
    pub cached_at: Instant,
    /// First instant at which the entry is no longer served.
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Create an entry stamped now.
    pub fn new(outcome: FetchOutcome<T>, ttl: Duration) -> Self {
        let cached_at = Instant::now();
        Self {
            outcome,
            cached_at,
            expires_at: cached_at
                .checked_add(ttl)
                .unwrap_or_else(|| cached_at + FAR_FUTURE),
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Check if this entry is still valid (not expired).
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }
}

struct CacheState<T> {
    entry: Option<CacheEntry<T>>,
    in_flight: Option<Pending<T>>,
    runs: u64,
}

/// A deferred computation whose outcome is shared for `ttl` after it resolves.
///
/// Clones share the same cache. Separate calls to [`Deferred::cache`] do not.
pub struct Cached<T> {
    source: Deferred<T>,
    ttl: Duration,
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            ttl: self.ttl,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> Cached<T> {
    pub fn new(source: Deferred<T>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: Arc::new(Mutex::new(CacheState {
                entry: None,
                in_flight: None,
                runs: 0,
            })),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of underlying runs this instance has started.
    pub fn runs(&self) -> u64 {
        self.state.lock().runs
    }

    /// The current entry, if one exists and has not expired.
    pub fn entry(&self) -> Option<CacheEntry<T>> {
        self.state
            .lock()
            .entry
            .as_ref()
            .filter(|entry| entry.is_valid())
            .cloned()
    }

    /// Drop the current entry so the next start runs the source again.
    pub fn invalidate(&self) {
        self.state.lock().entry = None;
    }
}

impl<T: Clone + Send + 'static> Computation for Cached<T> {
    type Output = T;

    fn start(&self) -> Pending<T> {
        let pending = {
            let mut state = self.state.lock();

            if let Some(entry) = state.entry.as_ref().filter(|entry| entry.is_valid()) {
                tracing::trace!(parent: self.source.span(), "cache hit");
                return Pending::resolved(entry.outcome.clone());
            }
            if let Some(in_flight) = &state.in_flight {
                return in_flight.clone();
            }

            let pending = Pending::new();
            let weak: Weak<Mutex<CacheState<T>>> = Arc::downgrade(&self.state);
            let ttl = self.ttl;
            pending.on_complete(move |outcome| {
                if let Some(state) = weak.upgrade() {
                    let mut state = state.lock();
                    state.entry = Some(CacheEntry::new(outcome.clone(), ttl));
                    state.in_flight = None;
                }
            });

            state.entry = None;
            state.in_flight = Some(pending.clone());
            state.runs += 1;
            tracing::debug!(
                parent: self.source.span(),
                ttl_ms = ttl.as_millis() as u64,
                run = state.runs,
                "cache miss, starting run"
            );
            pending
        };

        self.source.launch(&pending);
        pending
    }
}
