//! Per-job poll loop: one spawned task per watched job, shared by all of
//! its subscribers, stopping at terminal states, exhaustion, or when the
//! last subscriber leaves.

use crate::PollConfig;
use chrono::Utc;
use grade_types::{FetchError, Job, JobState, JobStore, StatusFetcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Subscribers for one job id plus the wake handle of its poll loop.
pub(crate) struct JobWatchers {
    pub subs: HashMap<u64, mpsc::UnboundedSender<Job>>,
    pub next_sub_id: u64,
    /// `Some` while a poll loop is active for this job. Notifying it wakes
    /// the loop out of its sleep so it can re-check its subscribers.
    pub poll: Option<Arc<Notify>>,
}

impl JobWatchers {
    pub fn new() -> Self {
        Self {
            subs: HashMap::new(),
            next_sub_id: 0,
            poll: None,
        }
    }
}

pub(crate) type Registry = Arc<Mutex<HashMap<String, JobWatchers>>>;

/// Send a snapshot to every live subscriber of `job_id`. Closed receivers
/// are ignored; their entries are removed by `JobWatch::drop`.
pub(crate) fn notify_all(registry: &Registry, job_id: &str, job: &Job) {
    if let Ok(guard) = registry.lock() {
        if let Some(watchers) = guard.get(job_id) {
            for tx in watchers.subs.values() {
                let _ = tx.send(job.clone());
            }
        }
    }
}

/// Confirm under the registry lock that no subscriber remains and, if so,
/// release the loop slot. Returns false when a watcher attached since the
/// last check; the loop must keep running for it.
fn release_if_idle(registry: &Registry, job_id: &str) -> bool {
    let Ok(mut guard) = registry.lock() else {
        return true;
    };
    match guard.get_mut(job_id) {
        Some(watchers) if !watchers.subs.is_empty() => false,
        Some(_) | None => {
            guard.remove(job_id);
            true
        }
    }
}

/// Release the loop slot after a terminal or synthetic snapshot was stored,
/// re-sending that snapshot under the lock so a watcher that attached
/// between the regular notify and this cleanup still observes it. Duplicate
/// delivery is safe: snapshot replacement is idempotent.
fn finish_with(registry: &Registry, job_id: &str, job: &Job) {
    let Ok(mut guard) = registry.lock() else {
        return;
    };
    let abandoned = match guard.get_mut(job_id) {
        Some(watchers) => {
            watchers.poll = None;
            for tx in watchers.subs.values() {
                let _ = tx.send(job.clone());
            }
            watchers.subs.is_empty()
        }
        None => false,
    };
    if abandoned {
        guard.remove(job_id);
    }
}

/// Sleep before retry number `failures`: interval doubled per consecutive
/// failure, capped.
fn backoff_delay(failures: u32, config: &PollConfig) -> std::time::Duration {
    let exp = failures.saturating_sub(1).min(16);
    config
        .interval
        .saturating_mul(1u32 << exp)
        .min(config.max_backoff)
}

/// Terminal snapshot produced locally when the backend cannot be asked any
/// further. Keeps the known creation time and lineage when a cached
/// snapshot exists. Marked synthetic so a fresh watch retries the job.
fn synthetic_failure(job_id: &str, prev: Option<&Job>, reason: &str) -> Job {
    let now = Utc::now().to_rfc3339();
    Job {
        job_id: job_id.to_string(),
        state: JobState::Failed,
        created_at: prev.map(|j| j.created_at.clone()).unwrap_or_else(|| now.clone()),
        updated_at: now,
        source_job_id: prev.and_then(|j| j.source_job_id.clone()),
        result: None,
        error: Some(reason.to_string()),
        synthetic_failure: true,
    }
}

/// Spawn the poll loop for `job_id`. The caller has already registered the
/// `wake` handle in the registry, which is what guarantees at most one loop
/// per job id. Every exit path re-checks the subscriber list inside the
/// registry lock, so a watcher attaching while the loop winds down either
/// keeps it alive or receives the final snapshot.
pub(crate) fn spawn_poll_loop(
    job_id: String,
    fetcher: Arc<dyn StatusFetcher>,
    store: Arc<dyn JobStore>,
    registry: Registry,
    config: PollConfig,
    wake: Arc<Notify>,
) {
    tokio::spawn(async move {
        debug!(job_id = %job_id, "poll loop started");
        let mut failures: u32 = 0;
        let mut delay = config.interval;
        let final_snapshot = loop {
            // At most one fetch in flight per job id: snapshots apply to the
            // store strictly in completion order.
            match fetcher.fetch_status(&job_id).await {
                Ok(job) => {
                    failures = 0;
                    delay = config.interval;
                    let terminal = job.state.is_terminal();
                    apply(&*store, &registry, &job_id, job.clone()).await;
                    if terminal {
                        info!(job_id = %job_id, "job reached terminal state");
                        break Some(job);
                    }
                }
                Err(err) if !err.is_transient() => {
                    warn!(job_id = %job_id, error = %err, "status fetch rejected");
                    let reason = match err {
                        FetchError::NotFound(_) => "job not found on backend".to_string(),
                        other => other.to_string(),
                    };
                    let prev = store.get(&job_id).await.ok().flatten();
                    let job = synthetic_failure(&job_id, prev.as_ref(), &reason);
                    apply(&*store, &registry, &job_id, job.clone()).await;
                    break Some(job);
                }
                Err(err) => {
                    failures += 1;
                    warn!(job_id = %job_id, failures, error = %err, "status fetch failed");
                    if failures >= config.max_failures {
                        error!(job_id = %job_id, "polling exhausted, giving up");
                        let prev = store.get(&job_id).await.ok().flatten();
                        let job = synthetic_failure(&job_id, prev.as_ref(), "polling exhausted");
                        apply(&*store, &registry, &job_id, job.clone()).await;
                        break Some(job);
                    }
                    delay = backoff_delay(failures, &config);
                }
            }
            if release_if_idle(&registry, &job_id) {
                break None;
            }
            tokio::select! {
                _ = wake.notified() => {
                    // Woken by an unsubscribe; stop if nobody is left,
                    // otherwise fetch again right away.
                    if release_if_idle(&registry, &job_id) {
                        break None;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };
        if let Some(job) = final_snapshot {
            finish_with(&registry, &job_id, &job);
        }
        debug!(job_id = %job_id, "poll loop stopped");
    });
}

async fn apply(store: &dyn JobStore, registry: &Registry, job_id: &str, job: Job) {
    if let Err(err) = store.put(job.clone()).await {
        warn!(job_id = %job_id, error = %err, "failed to store snapshot");
    }
    notify_all(registry, job_id, &job);
}
