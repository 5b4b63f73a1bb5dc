//! Job lifecycle tracking and polling for the exam grading client.
//!
//! One `JobTracker` per client session, handed to views explicitly. Views
//! call `watch` to follow a job to its terminal state, `query_history` for
//! filtered listings, `reprocess` to derive a new job from an existing file,
//! and `peek` for synchronous-style rendering of a cached snapshot. All
//! concurrent watchers of one job share a single poll loop.

mod config;
mod scheduler;
mod tracker;

pub use config::PollConfig;
pub use grade_types::{
    FetchError, GradeResult, HistoryFilter, HistoryPage, Job, JobState, JobStore, JobStoreError,
    QuestionScore, StatusFetcher,
};
pub use tracker::{JobTracker, JobWatch, TrackerError};
