//! **JobProcessor**: runs exactly one state-transition step per call
//! (spec.md §4.7). All outside calls — metadata reads/writes, executor
//! submits/polls — happen here; the `JobManager` only owns ticket
//! lifecycle and cache writes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use trac_core::{TenantContext, TracError};
use trac_executor::{BackoffConfig, ExecutorStatus, JobExecutorDriver, JobSpec, PollOutcome};
use trac_metadata_service::Principal;
use trac_types::Value;

use crate::lookup::MetadataLookup;
use crate::types::{JobRecord, JobState};

/// Result of one `step` call.
pub enum StepOutcome {
    /// The job is still in flight; the manager persists `JobRecord` and
    /// moves on.
    Advanced(JobRecord),
    /// The job reached `COMPLETED`/`FAILED`/`CANCELLED` and its result
    /// (if any) has already been persisted; the manager removes the
    /// cache entry.
    Finalized(JobRecord),
}

/// Watchdog threshold for a job stuck without progress (spec.md §4.7:
/// default 15 minutes).
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(15 * 60);

pub struct JobProcessor<D: JobExecutorDriver> {
    executor: Arc<D>,
    metadata: Arc<dyn MetadataLookup>,
    backoff: BackoffConfig,
    watchdog: Duration,
}

impl<D: JobExecutorDriver> JobProcessor<D> {
    pub fn new(executor: Arc<D>, metadata: Arc<dyn MetadataLookup>) -> Self {
        Self { executor, metadata, backoff: BackoffConfig::default(), watchdog: DEFAULT_WATCHDOG }
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub async fn step(
        &self,
        tenant: &TenantContext,
        principal: &Principal,
        mut record: JobRecord,
    ) -> Result<StepOutcome, TracError> {
        if record.state.is_terminal() {
            return Ok(StepOutcome::Finalized(record));
        }

        if record.cancel_requested {
            return self.cancel(&mut record).await;
        }

        let elapsed = (Utc::now() - record.last_activity)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if matches!(record.state, JobState::Submitted | JobState::Running) && elapsed > self.watchdog {
            record.error = Some("watchdog: no progress within threshold (LOST)".to_string());
            record.state = JobState::Failed;
            record.touch();
            return Ok(StepOutcome::Finalized(record));
        }

        match record.state {
            JobState::Created => self.validate(tenant, &mut record).await?,
            JobState::Validated => self.resolve_inputs(&mut record),
            JobState::Queued => self.submit(&mut record).await?,
            JobState::Submitted | JobState::Running => self.poll(&mut record).await?,
            JobState::Finishing => return self.finish(tenant, principal, record).await,
            JobState::Completed | JobState::Failed | JobState::Cancelled => {
                return Ok(StepOutcome::Finalized(record))
            }
        }

        record.touch();
        Ok(StepOutcome::Advanced(record))
    }

    async fn validate(&self, tenant: &TenantContext, record: &mut JobRecord) -> Result<(), TracError> {
        if !self.metadata.exists(tenant, &record.definition.target).await? {
            record.state = JobState::Failed;
            record.error = Some(format!("target object {} not found", record.definition.target));
            return Ok(());
        }
        for (name, object_id) in &record.definition.inputs {
            if !self.metadata.exists(tenant, object_id).await? {
                record.state = JobState::Failed;
                record.error = Some(format!("input '{name}' references missing object {object_id}"));
                return Ok(());
            }
        }
        record.state = JobState::Validated;
        Ok(())
    }

    /// Inputs are already concrete object ids in this record shape (no
    /// floating "latest" selectors to pin) — this step exists so the
    /// state machine's `VALIDATED→QUEUED` edge is explicit and a future
    /// selector-resolving definition slots in without renaming states.
    fn resolve_inputs(&self, record: &mut JobRecord) {
        record.state = JobState::Queued;
    }

    async fn submit(&self, record: &mut JobRecord) -> Result<(), TracError> {
        let spec = JobSpec::new(&record.definition.target)
            .with_args(record.definition.inputs.values().cloned());
        let state = self.executor.submit(&record.job_id, &spec, &record.definition.sandbox).await?;
        record.executor_state = Some(serde_json::to_value(state).map_err(|e| TracError::internal(e.to_string()))?);
        record.state = JobState::Submitted;
        Ok(())
    }

    async fn poll(&self, record: &mut JobRecord) -> Result<(), TracError> {
        let state = self.decode_executor_state(record)?;
        let outcome = trac_executor::poll_with_retry(&self.backoff, || self.executor.poll(&state)).await?;
        self.apply_poll_outcome(record, outcome);
        Ok(())
    }

    fn apply_poll_outcome(&self, record: &mut JobRecord, outcome: PollOutcome) {
        match outcome.status {
            ExecutorStatus::Queued | ExecutorStatus::Running => {
                record.state = JobState::Running;
            }
            ExecutorStatus::Succeeded | ExecutorStatus::Failed | ExecutorStatus::Lost | ExecutorStatus::Cancelled => {
                if outcome.status == ExecutorStatus::Failed || outcome.status == ExecutorStatus::Lost {
                    record.error = Some(format!("executor reported {:?}", outcome.status));
                }
                if outcome.status == ExecutorStatus::Cancelled {
                    record.state = JobState::Cancelled;
                } else {
                    record.state = JobState::Finishing;
                }
            }
        }
    }

    async fn finish(
        &self,
        tenant: &TenantContext,
        principal: &Principal,
        mut record: JobRecord,
    ) -> Result<StepOutcome, TracError> {
        let executor_state = self.decode_executor_state(&record)?;
        match self.executor.fetch_result(&executor_state).await {
            Ok(result) => {
                let mut attrs = std::collections::BTreeMap::new();
                attrs.insert("trac_job_id".to_string(), Value::String(record.job_id.clone()));
                let object_id = self
                    .metadata
                    .write_result(tenant, principal, result.result_metadata, attrs)
                    .await?;
                record.result_object_id = Some(object_id);
                record.state = JobState::Completed;
            }
            Err(e) => {
                record.error = Some(record.error.clone().unwrap_or_else(|| e.message.clone()));
                record.state = JobState::Failed;
            }
        }
        record.touch();
        Ok(StepOutcome::Finalized(record))
    }

    async fn cancel(&self, record: &mut JobRecord) -> Result<StepOutcome, TracError> {
        if let Some(state) = record.executor_state.clone() {
            if let Ok(state) = serde_json::from_value(state) {
                let _ = self.executor.cancel(&state).await;
            }
        }
        record.state = JobState::Cancelled;
        record.touch();
        Ok(StepOutcome::Finalized(record))
    }

    fn decode_executor_state(&self, record: &JobRecord) -> Result<D::State, TracError> {
        let raw = record
            .executor_state
            .clone()
            .ok_or_else(|| TracError::internal(format!("job {} has no executor state", record.job_id)))?;
        serde_json::from_value(raw).map_err(|e| TracError::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use trac_executor::{ExecutionResult, ExecutorStatus, LogChunk, SandboxConfig};

    use crate::types::JobDefinition;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct FakeState;

    struct FakeExecutor {
        cancelled: AtomicBool,
    }

    #[async_trait]
    impl JobExecutorDriver for FakeExecutor {
        type State = FakeState;

        async fn submit(&self, _job_key: &str, _spec: &JobSpec, _sandbox: &SandboxConfig) -> Result<Self::State, TracError> {
            Ok(FakeState)
        }
        async fn poll(&self, _state: &Self::State) -> Result<PollOutcome, TracError> {
            Ok(PollOutcome::new(ExecutorStatus::Running))
        }
        async fn cancel(&self, _state: &Self::State) -> Result<(), TracError> {
            self.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn fetch_result(&self, _state: &Self::State) -> Result<ExecutionResult, TracError> {
            Ok(ExecutionResult { result_metadata: serde_json::json!({}), outputs: vec![] })
        }
        async fn fetch_logs(&self, _state: &Self::State, _from_seq: u64) -> Result<Vec<LogChunk>, TracError> {
            Ok(vec![])
        }
    }

    struct FakeLookup {
        known: Vec<String>,
    }

    #[async_trait]
    impl MetadataLookup for FakeLookup {
        async fn exists(&self, _tenant: &TenantContext, object_id: &str) -> Result<bool, TracError> {
            Ok(self.known.iter().any(|k| k == object_id))
        }
        async fn write_result(
            &self,
            _tenant: &TenantContext,
            _principal: &Principal,
            _definition: serde_json::Value,
            _attrs: Map<String, Value>,
        ) -> Result<String, TracError> {
            Ok("result-object".to_string())
        }
    }

    fn tenant() -> TenantContext {
        TenantContext::new("acme")
    }

    fn principal() -> Principal {
        Principal { user_id: "u1".to_string(), user_name: "Test".to_string() }
    }

    fn job(target: &str) -> JobRecord {
        JobRecord::new("job-1", JobDefinition { target: target.to_string(), ..Default::default() })
    }

    #[tokio::test]
    async fn validate_fails_when_target_is_missing() {
        let processor = JobProcessor::new(
            Arc::new(FakeExecutor { cancelled: AtomicBool::new(false) }),
            Arc::new(FakeLookup { known: vec![] }),
        );
        let outcome = processor.step(&tenant(), &principal(), job("missing-model")).await.unwrap();
        match outcome {
            StepOutcome::Finalized(record) => {
                assert_eq!(record.state.as_str(), "FAILED");
                assert!(record.error.unwrap().contains("not found"));
            }
            StepOutcome::Advanced(_) => panic!("expected finalized failure"),
        }
    }

    #[tokio::test]
    async fn cancel_requested_calls_executor_cancel_and_finalizes() {
        let executor = Arc::new(FakeExecutor { cancelled: AtomicBool::new(false) });
        let processor = JobProcessor::new(executor.clone(), Arc::new(FakeLookup { known: vec!["model-1".to_string()] }));
        let mut record = job("model-1");
        record.state = JobState::Running;
        record.executor_state = Some(serde_json::to_value(FakeState).unwrap());
        record.cancel_requested = true;

        let outcome = processor.step(&tenant(), &principal(), record).await.unwrap();
        match outcome {
            StepOutcome::Finalized(record) => assert_eq!(record.state.as_str(), "CANCELLED"),
            StepOutcome::Advanced(_) => panic!("expected finalized cancellation"),
        }
        assert!(executor.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn watchdog_marks_stale_running_job_failed() {
        let processor = JobProcessor::new(
            Arc::new(FakeExecutor { cancelled: AtomicBool::new(false) }),
            Arc::new(FakeLookup { known: vec!["model-1".to_string()] }),
        )
        .with_watchdog(Duration::from_secs(0));
        let mut record = job("model-1");
        record.state = JobState::Running;
        record.last_activity = Utc::now() - chrono::Duration::seconds(1);

        let outcome = processor.step(&tenant(), &principal(), record).await.unwrap();
        match outcome {
            StepOutcome::Finalized(record) => {
                assert_eq!(record.state.as_str(), "FAILED");
                assert!(record.error.unwrap().contains("watchdog"));
            }
            StepOutcome::Advanced(_) => panic!("expected watchdog failure"),
        }
    }

    #[tokio::test]
    async fn terminal_job_is_a_no_op() {
        let processor = JobProcessor::new(
            Arc::new(FakeExecutor { cancelled: AtomicBool::new(false) }),
            Arc::new(FakeLookup { known: vec![] }),
        );
        let mut record = job("model-1");
        record.state = JobState::Completed;
        let outcome = processor.step(&tenant(), &principal(), record).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Finalized(r) if r.state == JobState::Completed));
    }
}
