//! The executor contract (spec.md §4.6): submit/poll/cancel/fetchResult/
//! fetchLogs over a pluggable batch runtime. Shaped after
//! `dog-queue::execution::Job` — an associated-type trait the caller is
//! generic over — but inverted: `Job` runs in-process, `JobExecutorDriver`
//! submits a spec to an external runtime and polls a returned handle.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use trac_core::TracError;

/// What to run. Intentionally thin: a driver decides how `program`/`args`
/// map onto its runtime (a literal argv for `LocalProcessExecutor`, a
/// container image + command for a container backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<String>,
}

impl JobSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Best-effort resource/isolation hints. A driver is free to ignore
/// fields it cannot enforce; `LocalProcessExecutor` enforces only
/// `timeout`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub cpu_limit: Option<f32>,
    pub memory_limit_mb: Option<u64>,
    pub timeout: Option<std::time::Duration>,
    pub network_isolated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Lost,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOutcome {
    pub status: ExecutorStatus,
    pub progress: Option<f32>,
    pub last_log_seq: Option<u64>,
}

impl PollOutcome {
    pub fn new(status: ExecutorStatus) -> Self {
        Self { status, progress: None, last_log_seq: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub result_metadata: serde_json::Value,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChunk {
    pub seq: u64,
    pub line: String,
}

/// A pluggable batch runtime. `State` is the serializable handle
/// `submit` returns and every other method takes back — the job cache
/// persists it between polls, so it must round-trip through JSON.
#[async_trait]
pub trait JobExecutorDriver: Send + Sync + 'static {
    type State: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    async fn submit(&self, job_key: &str, spec: &JobSpec, sandbox: &SandboxConfig) -> Result<Self::State, TracError>;

    async fn poll(&self, state: &Self::State) -> Result<PollOutcome, TracError>;

    /// Best-effort termination; idempotent — calling it on an already
    /// terminal job is a no-op, not an error.
    async fn cancel(&self, state: &Self::State) -> Result<(), TracError>;

    /// Only valid once `poll` has observed `ExecutorStatus::Succeeded`.
    async fn fetch_result(&self, state: &Self::State) -> Result<ExecutionResult, TracError>;

    /// Optional: drivers that don't capture logs return an empty vec.
    async fn fetch_logs(&self, state: &Self::State, from_seq: u64) -> Result<Vec<LogChunk>, TracError>;
}
