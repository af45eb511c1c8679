// monofetch library root.
// Deferred single-value HTTP fetches with status classification, TTL caching, and bounded waits.

pub mod cache;
pub mod config;
pub mod downstream;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;

pub use cache::{CacheEntry, Cached};
pub use config::Config;
pub use downstream::{FetchRequest, MoneyModel, UserView};
pub use error::{ConfigError, FetchError, Result};
pub use orchestrator::FetchOrchestrator;
pub use pipeline::{BoundedResolver, Computation, Deferred, FetchOutcome, ResolveState};
