//! Job snapshot and lifecycle types.

use serde::{Deserialize, Serialize};

/// Pipeline state of a grading job. Set by the backend; the client never
/// advances a state locally, it only replaces its cached snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Uploaded,
    Processing,
    Assessing,
    GeneratingFeedback,
    Completed,
    Failed,
}

impl JobState {
    /// `completed` and `failed` are sticky: the backend reports no further
    /// transitions and polling must stop.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Uploaded => "uploaded",
            JobState::Processing => "processing",
            JobState::Assessing => "assessing",
            JobState::GeneratingFeedback => "generating_feedback",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score for one exam question as reported by the grading pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub number: u32,
    pub score: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Structured grading outcome, present only on `completed` jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub score: f64,
    pub grade: String,
    #[serde(default)]
    pub breakdown: Vec<QuestionScore>,
}

/// Complete point-in-time snapshot of one grading submission.
///
/// Snapshots always replace cached data wholesale; the backend guarantees a
/// snapshot is complete for its state, so a partial merge is never needed.
/// `result` and `error` are mutually exclusive and each implies the matching
/// terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub state: JobState,
    /// RFC3339, set by the backend at creation, immutable.
    pub created_at: String,
    /// RFC3339, timestamp of this snapshot.
    pub updated_at: String,
    /// Job this one was reprocessed from; absent for original submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GradeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when this `failed` snapshot was produced locally (polling gave up
    /// or the backend no longer knows the id) rather than reported by the
    /// backend. Never on the wire. A fresh watch retries such jobs.
    #[serde(skip)]
    pub synthetic_failure: bool,
}

/// Filter over job history: `None` matches every state.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub state: Option<JobState>,
}

/// One page of history, most recent `created_at` first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub has_more: bool,
}
