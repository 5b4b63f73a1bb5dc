//! In-memory JobStore: snapshots in a map, listing by recency.

use grade_types::{HistoryFilter, Job, JobStore, JobStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory JobStore: keeps the last-known snapshot per job id. Evicts
/// nothing; records live for the process lifetime.
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
        let guard = self.jobs.read().await;
        Ok(guard.get(job_id).cloned())
    }

    async fn put(&self, job: Job) -> Result<(), JobStoreError> {
        let mut guard = self.jobs.write().await;
        guard.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<Job>, JobStoreError> {
        let guard = self.jobs.read().await;
        let mut out: Vec<Job> = guard
            .values()
            .filter(|j| filter.state.map_or(true, |s| j.state == s))
            .cloned()
            .collect();
        // RFC3339 with a fixed offset sorts lexicographically by time.
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grade_types::JobState;

    fn job(id: &str, state: JobState, created_at: &str) -> Job {
        Job {
            job_id: id.to_string(),
            state,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            source_job_id: None,
            result: None,
            error: None,
            synthetic_failure: false,
        }
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = InMemoryJobStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_full_snapshot() {
        let store = InMemoryJobStore::new();
        let mut j = job("a", JobState::Processing, "2026-01-01T00:00:00+00:00");
        j.error = Some("stale".to_string());
        store.put(j).await.unwrap();

        let fresh = job("a", JobState::Completed, "2026-01-01T00:00:00+00:00");
        store.put(fresh.clone()).await.unwrap();
        let got = store.get("a").await.unwrap().unwrap();
        // full replace: the old error field does not survive
        assert_eq!(got, fresh);
    }

    #[tokio::test]
    async fn put_same_snapshot_twice_is_idempotent() {
        let store = InMemoryJobStore::new();
        let j = job("a", JobState::Assessing, "2026-01-01T00:00:00+00:00");
        store.put(j.clone()).await.unwrap();
        store.put(j.clone()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap(), j);
        assert_eq!(store.list(&HistoryFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_orders_by_created_at_descending() {
        let store = InMemoryJobStore::new();
        store
            .put(job("old", JobState::Completed, "2026-01-01T00:00:00+00:00"))
            .await
            .unwrap();
        store
            .put(job("new", JobState::Uploaded, "2026-01-03T00:00:00+00:00"))
            .await
            .unwrap();
        store
            .put(job("mid", JobState::Failed, "2026-01-02T00:00:00+00:00"))
            .await
            .unwrap();

        let all = store.list(&HistoryFilter::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let store = InMemoryJobStore::new();
        store
            .put(job("a", JobState::Completed, "2026-01-01T00:00:00+00:00"))
            .await
            .unwrap();
        store
            .put(job("b", JobState::Processing, "2026-01-02T00:00:00+00:00"))
            .await
            .unwrap();

        let done = store
            .list(&HistoryFilter {
                state: Some(JobState::Completed),
            })
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].job_id, "a");
    }
}
