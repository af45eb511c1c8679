// Downstream service module.
// Provides the transport, request descriptor, and payload types for the money service.

pub mod client;
pub mod request;
pub mod types;

pub use client::{DownstreamClient, RawResponse, Transport};
pub use request::{FetchRequest, SINGLE_MONEY_PATH};
pub use types::{MoneyModel, SharedList, UserView};
