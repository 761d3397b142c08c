//! trac-executor: the Job Executor Driver (spec.md §4.6) — a pluggable
//! interface over a batch runtime. `trac-orchestrator` drives jobs
//! through a `JobExecutorDriver` without knowing which runtime backs it.

pub mod backoff;
pub mod driver;
pub mod local;

pub use backoff::{poll_with_retry, BackoffConfig};
pub use driver::{
    ExecutionResult, ExecutorStatus, JobExecutorDriver, JobSpec, LogChunk, PollOutcome, SandboxConfig,
};
pub use local::{LocalProcessExecutor, LocalProcessState};
