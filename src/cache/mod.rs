// Cache module for resolved fetch outcomes.
// Wraps deferred computations so repeated reads inside a TTL window reuse one result.

pub mod store;

pub use store::{CacheEntry, Cached, DEFAULT_TTL};
