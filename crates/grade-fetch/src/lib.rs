//! Status fetcher for the grading backend.

#[cfg(feature = "test-util")]
pub mod mock;
mod http;

pub use grade_types::{FetchError, StatusFetcher};
pub use http::HttpStatusFetcher;

#[cfg(feature = "test-util")]
pub use mock::MockFetcher;
