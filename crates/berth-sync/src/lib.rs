//! berth-sync: background polling for berth clients.
//!
//! Keeps repositories fresh by running an injected fetch operation on a
//! server-directed interval with bounded random skew, so independent
//! clients never synchronize their polling against shared infrastructure.
//! The fetch itself is typically a `berth-git` fetch of one remote (see
//! [`RemoteFetch`]); this crate only owns the schedule.

pub mod fetcher;
pub mod remote;
pub mod skew;

pub use fetcher::{BackgroundFetcher, FetchOperation, FetcherError, PollIntervalSource};
pub use remote::RemoteFetch;
pub use skew::{
    clamp_interval, skew_interval, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, SKEW_UPPER_BOUND,
};
