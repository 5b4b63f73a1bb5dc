//! Traits for the backend boundary and the local snapshot store.

use crate::{HistoryFilter, HistoryPage, Job};
use async_trait::async_trait;

/// Stateless backend boundary: one network round trip per call, no retries
/// (retries are the poll scheduler's responsibility).
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Fetch the current snapshot for one job.
    async fn fetch_status(&self, job_id: &str) -> Result<Job, FetchError>;

    /// Fetch one page of job history, most recent `created_at` first.
    async fn fetch_history(
        &self,
        filter: &HistoryFilter,
        page: u32,
    ) -> Result<HistoryPage, FetchError>;

    /// Ask the backend to create a new job from the file behind `job_id`.
    /// Returns the new id immediately; the new job starts in its initial
    /// state and the caller must begin watching it.
    async fn reprocess(&self, job_id: &str) -> Result<String, FetchError>;
}

/// Local snapshot store: in-memory mapping from job id to its last-known
/// snapshot, single source for all views.
///
/// Contract: `get` returns `Ok(None)` when the job id has never been
/// observed; `put` replaces the full snapshot (never a partial patch).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError>;

    /// Full-snapshot replace; a newer snapshot always wins.
    async fn put(&self, job: Job) -> Result<(), JobStoreError>;

    /// All known jobs matching `filter`, ordered by `created_at` descending.
    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<Job>, JobStoreError>;
}

/// Failure taxonomy for a single fetch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Transient transport failure; retried by the poll scheduler's back-off.
    #[error("network error: {0}")]
    Network(String),
    /// Job id unknown to the backend; not retried within a poll loop.
    #[error("job not found: {0}")]
    NotFound(String),
    /// Non-404 4xx-class response (bad request, auth); retrying the same
    /// request cannot succeed, so it fails fast instead of burning the
    /// failure bound.
    #[error("request rejected {status}: {message}")]
    Rejected { status: u16, message: String },
    /// 5xx-class response; treated as transient but counted toward the
    /// failure bound.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::NotFound(_) | FetchError::Rejected { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job store error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Network("timeout".to_string()).is_transient());
        assert!(FetchError::Server {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!FetchError::NotFound("gone".to_string()).is_transient());
        assert!(!FetchError::Rejected {
            status: 401,
            message: "bad token".to_string()
        }
        .is_transient());
    }
}
