//! `LocalProcessExecutor`: the simplest faithful reading of "local
//! process pool" from spec.md §4.6 — one child process per job, a
//! semaphore bounding concurrency the way `dog-queue::execution::
//! executor::JobExecutor` bounds in-process job concurrency, and a
//! `DashMap` tracking live handles for observability the same way.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use trac_core::TracError;

use crate::driver::{ExecutionResult, ExecutorStatus, JobExecutorDriver, JobSpec, LogChunk, PollOutcome, SandboxConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProcessState {
    pub job_key: String,
}

struct RunningJob {
    child: Mutex<Option<Child>>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    logs: Mutex<Vec<String>>,
    outcome: Mutex<Option<(ExecutorStatus, i32)>>,
    started: Instant,
    timeout: Option<std::time::Duration>,
}

/// Spawns one OS process per submitted job. Enforces `SandboxConfig::
/// timeout` (the only hint it can actually act on without a container
/// runtime underneath it); `cpu_limit`/`memory_limit_mb`/
/// `network_isolated` are accepted but not applied.
pub struct LocalProcessExecutor {
    semaphore: Arc<Semaphore>,
    jobs: Arc<DashMap<String, Arc<RunningJob>>>,
}

impl LocalProcessExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn job(&self, job_key: &str) -> Result<Arc<RunningJob>, TracError> {
        self.jobs
            .get(job_key)
            .map(|e| e.clone())
            .ok_or_else(|| TracError::not_found(format!("no local process tracked for job {job_key}")))
    }
}

#[async_trait]
impl JobExecutorDriver for LocalProcessExecutor {
    type State = LocalProcessState;

    async fn submit(&self, job_key: &str, spec: &JobSpec, sandbox: &SandboxConfig) -> Result<Self::State, TracError> {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| TracError::executor_transient("no local execution slots available"))?;

        let mut command = tokio::process::Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| TracError::executor_fatal(format!("failed to spawn job {job_key}: {e}")))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let running = Arc::new(RunningJob {
            child: Mutex::new(Some(child)),
            permit: Mutex::new(Some(permit)),
            logs: Mutex::new(Vec::new()),
            outcome: Mutex::new(None),
            started: Instant::now(),
            timeout: sandbox.timeout,
        });
        self.jobs.insert(job_key.to_string(), running.clone());

        if let Some(stdout) = stdout {
            spawn_log_reader(running.clone(), stdout);
        }
        if let Some(stderr) = stderr {
            spawn_log_reader(running.clone(), stderr);
        }

        let watcher = running.clone();
        tokio::spawn(async move {
            let status = {
                let mut guard = watcher.child.lock().await;
                match guard.as_mut() {
                    Some(child) => child.wait().await,
                    None => return,
                }
            };
            let mut outcome = watcher.outcome.lock().await;
            *outcome = Some(match status {
                Ok(s) if s.success() => (ExecutorStatus::Succeeded, 0),
                Ok(s) => (ExecutorStatus::Failed, s.code().unwrap_or(-1)),
                Err(_) => (ExecutorStatus::Lost, -1),
            });
            drop(outcome);
            watcher.permit.lock().await.take();
        });

        Ok(LocalProcessState { job_key: job_key.to_string() })
    }

    async fn poll(&self, state: &Self::State) -> Result<PollOutcome, TracError> {
        let job = self.job(&state.job_key)?;

        if let Some(timeout) = job.timeout {
            if job.started.elapsed() > timeout && job.outcome.lock().await.is_none() {
                self.cancel(state).await?;
                return Ok(PollOutcome::new(ExecutorStatus::Lost));
            }
        }

        let outcome = job.outcome.lock().await;
        let status = match &*outcome {
            None => ExecutorStatus::Running,
            Some((s, _)) => *s,
        };
        let last_log_seq = job.logs.lock().await.len() as u64;
        Ok(PollOutcome { status, progress: None, last_log_seq: Some(last_log_seq) })
    }

    async fn cancel(&self, state: &Self::State) -> Result<(), TracError> {
        let job = self.job(&state.job_key)?;
        if let Some(child) = job.child.lock().await.as_mut() {
            let _ = child.start_kill();
        }
        let mut outcome = job.outcome.lock().await;
        if outcome.is_none() {
            *outcome = Some((ExecutorStatus::Cancelled, -1));
            drop(outcome);
            job.permit.lock().await.take();
        }
        Ok(())
    }

    async fn fetch_result(&self, state: &Self::State) -> Result<ExecutionResult, TracError> {
        let job = self.job(&state.job_key)?;
        let outcome = job.outcome.lock().await;
        match &*outcome {
            Some((ExecutorStatus::Succeeded, code)) => Ok(ExecutionResult {
                result_metadata: serde_json::json!({"exit_code": code}),
                outputs: Vec::new(),
            }),
            _ => Err(TracError::invalid_input("fetchResult called before job reached SUCCEEDED")),
        }
    }

    async fn fetch_logs(&self, state: &Self::State, from_seq: u64) -> Result<Vec<LogChunk>, TracError> {
        let job = self.job(&state.job_key)?;
        let logs = job.logs.lock().await;
        Ok(logs
            .iter()
            .enumerate()
            .skip(from_seq as usize)
            .map(|(i, line)| LogChunk { seq: i as u64, line: line.clone() })
            .collect())
    }
}

fn spawn_log_reader<R>(job: Arc<RunningJob>, reader: R)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            job.logs.lock().await.push(line);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_job_runs_to_completion() {
        let executor = LocalProcessExecutor::new(2);
        let spec = JobSpec::new("echo").with_args(["hello"]);
        let state = executor.submit("job-1", &spec, &SandboxConfig::default()).await.unwrap();

        let mut outcome = executor.poll(&state).await.unwrap();
        for _ in 0..50 {
            if outcome.status != ExecutorStatus::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            outcome = executor.poll(&state).await.unwrap();
        }
        assert_eq!(outcome.status, ExecutorStatus::Succeeded);

        let result = executor.fetch_result(&state).await.unwrap();
        assert_eq!(result.result_metadata["exit_code"], 0);

        let logs = executor.fetch_logs(&state, 0).await.unwrap();
        assert_eq!(logs[0].line, "hello");
    }

    #[tokio::test]
    async fn fetch_result_before_completion_is_invalid_input() {
        let executor = LocalProcessExecutor::new(2);
        let spec = JobSpec::new("sleep").with_args(["1"]);
        let state = executor.submit("job-2", &spec, &SandboxConfig::default()).await.unwrap();
        let err = executor.fetch_result(&state).await.unwrap_err();
        assert!(matches!(err.kind, trac_core::TracErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn cancel_marks_job_cancelled() {
        let executor = LocalProcessExecutor::new(2);
        let spec = JobSpec::new("sleep").with_args(["5"]);
        let state = executor.submit("job-3", &spec, &SandboxConfig::default()).await.unwrap();
        executor.cancel(&state).await.unwrap();
        // Cancellation is best-effort and idempotent.
        executor.cancel(&state).await.unwrap();

        let outcome = executor.poll(&state).await.unwrap();
        assert_eq!(outcome.status, ExecutorStatus::Cancelled);
    }

    #[tokio::test]
    async fn submit_rejects_when_no_slots_available() {
        let executor = LocalProcessExecutor::new(1);
        let spec = JobSpec::new("sleep").with_args(["1"]);
        executor.submit("job-4", &spec, &SandboxConfig::default()).await.unwrap();
        let err = executor.submit("job-5", &spec, &SandboxConfig::default()).await.unwrap_err();
        assert!(matches!(err.kind, trac_core::TracErrorKind::ExecutorTransient));
    }
}
