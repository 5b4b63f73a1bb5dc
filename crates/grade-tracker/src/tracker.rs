//! JobTracker façade: watch, reprocess, query history, peek.

use crate::scheduler::{self, JobWatchers, Registry};
use crate::PollConfig;
use grade_types::{
    FetchError, HistoryFilter, HistoryPage, Job, JobStore, JobStoreError, StatusFetcher,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),
    #[error("store: {0}")]
    Store(#[from] JobStoreError),
}

/// Public API for views over the grading backend. Construct once per client
/// session and pass to views explicitly; the backend stays the single source
/// of truth and the tracker caches and reconciles.
pub struct JobTracker {
    fetcher: Arc<dyn StatusFetcher>,
    store: Arc<dyn JobStore>,
    config: PollConfig,
    registry: Registry,
}

impl JobTracker {
    pub fn new(
        fetcher: Arc<dyn StatusFetcher>,
        store: Arc<dyn JobStore>,
        config: PollConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to snapshot updates for `job_id`.
    ///
    /// The cached snapshot (if any) is delivered first. A poll loop is
    /// started when the record is missing, non-terminal, or a synthetic
    /// failure; if one is already running for this id the subscription
    /// attaches to it instead, so concurrent watchers never multiply
    /// backend load. Dropping the returned handle unsubscribes.
    pub async fn watch(&self, job_id: &str) -> Result<JobWatch, TrackerError> {
        let cached = self.store.get(job_id).await?;
        let needs_poll = cached
            .as_ref()
            .map_or(true, |j| !j.state.is_terminal() || j.synthetic_failure);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(ref job) = cached {
            let _ = tx.send(job.clone());
        }

        let (sub_id, spawn_wake) = {
            let mut guard = lock_registry(&self.registry);
            let watchers = guard
                .entry(job_id.to_string())
                .or_insert_with(JobWatchers::new);
            let sub_id = watchers.next_sub_id;
            watchers.next_sub_id += 1;
            watchers.subs.insert(sub_id, tx);
            let wake = if needs_poll && watchers.poll.is_none() {
                let wake = Arc::new(Notify::new());
                watchers.poll = Some(Arc::clone(&wake));
                Some(wake)
            } else {
                None
            };
            (sub_id, wake)
        };

        if let Some(wake) = spawn_wake {
            scheduler::spawn_poll_loop(
                job_id.to_string(),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                self.config,
                wake,
            );
        }

        Ok(JobWatch {
            job_id: job_id.to_string(),
            sub_id,
            rx,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Ask the backend to create a new job from the file behind `job_id`.
    ///
    /// One-shot: failures surface to the caller, and polling of the new job
    /// only starts when the caller watches the returned id. Keeping the two
    /// concerns separate keeps both testable.
    pub async fn reprocess(&self, job_id: &str) -> Result<String, TrackerError> {
        let new_id = self.fetcher.reprocess(job_id).await?;
        debug!(source = %job_id, new_job = %new_id, "reprocess accepted");
        Ok(new_id)
    }

    /// Fetch one page of history and merge it into the store. For each job
    /// the freshest of the backend and local snapshots wins, compared by
    /// `updated_at`, so a concurrently watched job is never rolled back.
    /// Watchers of refreshed jobs are notified.
    pub async fn query_history(
        &self,
        filter: &HistoryFilter,
        page: u32,
    ) -> Result<HistoryPage, TrackerError> {
        let fetched = self.fetcher.fetch_history(filter, page).await?;
        let mut jobs = Vec::with_capacity(fetched.jobs.len());
        for job in fetched.jobs {
            let local = self.store.get(&job.job_id).await?;
            let fresh = match local {
                Some(local) if local.updated_at > job.updated_at => local,
                _ => {
                    self.store.put(job.clone()).await?;
                    scheduler::notify_all(&self.registry, &job.job_id, &job);
                    job
                }
            };
            jobs.push(fresh);
        }
        Ok(HistoryPage {
            jobs,
            has_more: fetched.has_more,
        })
    }

    /// Read-only cached snapshot, without establishing a subscription.
    pub async fn peek(&self, job_id: &str) -> Result<Option<Job>, TrackerError> {
        Ok(self.store.get(job_id).await?)
    }
}

/// Live subscription to one job. Receive snapshots with `recv`; drop the
/// handle (or call `unsubscribe`) to detach. When the last watcher of a job
/// detaches, its poll loop is woken and stops without scheduling further
/// fetches; an in-flight request still completes and lands in the store.
pub struct JobWatch {
    job_id: String,
    sub_id: u64,
    rx: mpsc::UnboundedReceiver<Job>,
    registry: Registry,
}

impl JobWatch {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next snapshot update.
    pub async fn recv(&mut self) -> Option<Job> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.registry.lock() {
            let mut abandoned = false;
            if let Some(watchers) = guard.get_mut(&self.job_id) {
                watchers.subs.remove(&self.sub_id);
                if watchers.subs.is_empty() {
                    match watchers.poll {
                        // wake the loop so it stops without another poll
                        Some(ref wake) => wake.notify_one(),
                        None => abandoned = true,
                    }
                }
            }
            if abandoned {
                guard.remove(&self.job_id);
            }
        }
    }
}

fn lock_registry(
    registry: &Registry,
) -> std::sync::MutexGuard<'_, HashMap<String, JobWatchers>> {
    // Held only for map edits, never across an await; poisoning would mean
    // a panic inside one of those edits.
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
