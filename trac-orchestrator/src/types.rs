//! The job state machine and the cache-persisted record it drives
//! (spec.md §4.7).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trac_executor::SandboxConfig;

/// `CREATED → VALIDATED → QUEUED → SUBMITTED → RUNNING → FINISHING →
/// { COMPLETED | FAILED | CANCELLED }`. Persisted as the cache entry's
/// `status` string (its `Display`/`FromStr` round-trip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Validated,
    Queued,
    Submitted,
    Running,
    Finishing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Validated => "VALIDATED",
            JobState::Queued => "QUEUED",
            JobState::Submitted => "SUBMITTED",
            JobState::Running => "RUNNING",
            JobState::Finishing => "FINISHING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to run and against what metadata. `target` names the MODEL or
/// FLOW object the job executes; `inputs` names the DATA objects it
/// reads, by logical parameter name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDefinition {
    pub target: String,
    pub inputs: BTreeMap<String, String>,
    pub sandbox: SandboxConfig,
}

/// The value stored under a job's cache key (spec.md §4.5's opaque
/// `Entry::value`, specialized to what the orchestrator needs to resume
/// a job from any state after a crash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub state: JobState,
    pub definition: JobDefinition,
    /// The executor driver's serialized `State`, once `submit` has run.
    pub executor_state: Option<serde_json::Value>,
    pub attempt: u32,
    pub last_activity: DateTime<Utc>,
    /// Set once `FINISHING` resolves to a terminal outcome; `None` before.
    pub error: Option<String>,
    /// Metadata object id of the written RESULT, once persisted.
    pub result_object_id: Option<String>,
    /// External cancellation request; checked before every step.
    pub cancel_requested: bool,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, definition: JobDefinition) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Created,
            definition,
            executor_state: None,
            attempt: 0,
            last_activity: Utc::now(),
            error: None,
            result_object_id: None,
            cancel_requested: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
