//! Component B (RangeFetcher): concurrent, retrying, ranged downloads
//! from object storage, per spec §4.B.

pub mod client;
pub mod pool;
pub mod retry;

pub use client::{FetchClient, HttpRangeClient, S3RangeClient};
pub use pool::{fetch_ranges, FetchedRange};
pub use retry::{fetch_with_retry, FetchOutcome, FetchResult, RetryPolicy};
