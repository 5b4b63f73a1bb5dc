//! Mock fetcher for tests: scripted snapshots, no network.

use chrono::Utc;
use grade_types::{FetchError, HistoryFilter, HistoryPage, Job, JobState, StatusFetcher};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 20;

struct Inner {
    /// Per-job queue of scripted responses. The last entry repeats, so a
    /// terminal snapshot (or a persistent error) stays observable.
    scripts: HashMap<String, VecDeque<Result<Job, FetchError>>>,
    calls: HashMap<String, usize>,
    history: Vec<Job>,
    page_size: usize,
}

/// Mock StatusFetcher with scripted per-job responses and call counting.
pub struct MockFetcher {
    inner: Mutex<Inner>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                scripts: HashMap::new(),
                calls: HashMap::new(),
                history: Vec::new(),
                page_size: DEFAULT_PAGE_SIZE,
            }),
        }
    }

    /// Append one scripted response for `job_id`.
    pub fn push_status(&self, job_id: &str, response: Result<Job, FetchError>) {
        let mut inner = self.lock();
        inner
            .scripts
            .entry(job_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Replace the whole script for `job_id`.
    pub fn set_status(&self, job_id: &str, responses: Vec<Result<Job, FetchError>>) {
        let mut inner = self.lock();
        inner.scripts.insert(job_id.to_string(), responses.into());
    }

    /// Number of `fetch_status` calls seen for `job_id`.
    pub fn status_calls(&self, job_id: &str) -> usize {
        let inner = self.lock();
        inner.calls.get(job_id).copied().unwrap_or(0)
    }

    pub fn set_history(&self, jobs: Vec<Job>) {
        self.lock().history = jobs;
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size.max(1);
    }

    /// Backend-side upload: mints a job in its initial state and scripts it.
    pub fn upload(&self, _file_name: &str) -> String {
        let job = minted_job(None);
        let id = job.job_id.clone();
        self.push_status(&id, Ok(job));
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock fetcher lock poisoned")
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn minted_job(source_job_id: Option<String>) -> Job {
    let now = Utc::now().to_rfc3339();
    Job {
        job_id: Uuid::new_v4().to_string(),
        state: JobState::Uploaded,
        created_at: now.clone(),
        updated_at: now,
        source_job_id,
        result: None,
        error: None,
        synthetic_failure: false,
    }
}

#[async_trait::async_trait]
impl StatusFetcher for MockFetcher {
    async fn fetch_status(&self, job_id: &str) -> Result<Job, FetchError> {
        let mut inner = self.lock();
        *inner.calls.entry(job_id.to_string()).or_insert(0) += 1;
        match inner.scripts.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| {
                Err(FetchError::Network("script exhausted".to_string()))
            }),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Network("script exhausted".to_string()))),
            None => Err(FetchError::NotFound(format!("no job {job_id}"))),
        }
    }

    async fn fetch_history(
        &self,
        filter: &HistoryFilter,
        page: u32,
    ) -> Result<HistoryPage, FetchError> {
        let inner = self.lock();
        let mut jobs: Vec<Job> = inner
            .history
            .iter()
            .filter(|j| filter.state.map_or(true, |s| j.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let start = (page as usize) * inner.page_size;
        let has_more = jobs.len() > start + inner.page_size;
        let jobs = jobs.into_iter().skip(start).take(inner.page_size).collect();
        Ok(HistoryPage { jobs, has_more })
    }

    async fn reprocess(&self, job_id: &str) -> Result<String, FetchError> {
        let known = {
            let inner = self.lock();
            inner.scripts.contains_key(job_id) || inner.history.iter().any(|j| j.job_id == job_id)
        };
        if !known {
            return Err(FetchError::NotFound(format!("no job {job_id}")));
        }
        let job = minted_job(Some(job_id.to_string()));
        let new_id = job.job_id.clone();
        self.push_status(&new_id, Ok(job));
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_pops_in_order_and_repeats_last() {
        let fetcher = MockFetcher::new();
        let first = minted_job(None);
        let id = first.job_id.clone();
        let mut done = first.clone();
        done.state = JobState::Completed;
        fetcher.set_status(&id, vec![Ok(first.clone()), Ok(done.clone())]);

        assert_eq!(fetcher.fetch_status(&id).await.unwrap(), first);
        assert_eq!(fetcher.fetch_status(&id).await.unwrap(), done);
        assert_eq!(fetcher.fetch_status(&id).await.unwrap(), done);
        assert_eq!(fetcher.status_calls(&id), 3);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let fetcher = MockFetcher::new();
        assert!(matches!(
            fetcher.fetch_status("ghost").await,
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            fetcher.reprocess("ghost").await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reprocess_links_lineage() {
        let fetcher = MockFetcher::new();
        let original = fetcher.upload("exam.pdf");
        let derived = fetcher.reprocess(&original).await.unwrap();
        assert_ne!(derived, original);
        let job = fetcher.fetch_status(&derived).await.unwrap();
        assert_eq!(job.source_job_id.as_deref(), Some(original.as_str()));
        assert_eq!(job.state, JobState::Uploaded);
    }

    #[tokio::test]
    async fn history_pages_and_filters() {
        let fetcher = MockFetcher::new();
        fetcher.set_page_size(2);
        let mut jobs = Vec::new();
        for (i, state) in [
            JobState::Completed,
            JobState::Processing,
            JobState::Completed,
        ]
        .iter()
        .enumerate()
        {
            let mut j = minted_job(None);
            j.state = *state;
            j.created_at = format!("2026-01-0{}T00:00:00+00:00", i + 1);
            jobs.push(j);
        }
        fetcher.set_history(jobs);

        let page = fetcher
            .fetch_history(&HistoryFilter::default(), 0)
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 2);
        assert!(page.has_more);
        assert!(page.jobs[0].created_at > page.jobs[1].created_at);

        let done = fetcher
            .fetch_history(
                &HistoryFilter {
                    state: Some(JobState::Completed),
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(done.jobs.len(), 2);
        assert!(!done.has_more);
    }
}
