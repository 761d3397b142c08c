//! **JobManager**: the scan/ticket/step/write-back loop (spec.md §4.7),
//! grounded on the teacher's `Worker::run`/`process_next_job` shape — a
//! `tokio::select!` between a shutdown signal and one pass over the
//! cache's outstanding work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, instrument, warn};
use trac_core::{TenantContext, TracError};
use trac_executor::JobExecutorDriver;
use trac_metadata_service::Principal;
use trac_queue::{CacheKey, JobCache, JobCacheBackend, ReadMode, StatusQuery};

use crate::processor::{JobProcessor, StepOutcome};
use crate::types::JobRecord;

/// Statuses a sweep considers. All six non-terminal states are scanned —
/// `CREATED`/`VALIDATED` included, since stranding a job there until some
/// other actor happens to touch it would contradict the state machine's
/// intent of unattended progress.
fn non_terminal_statuses() -> Vec<String> {
    vec![
        "CREATED".to_string(),
        "VALIDATED".to_string(),
        "QUEUED".to_string(),
        "SUBMITTED".to_string(),
        "RUNNING".to_string(),
        "FINISHING".to_string(),
    ]
}

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub poll_interval: Duration,
    pub ticket_duration: Option<Duration>,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(2), ticket_duration: None }
    }
}

pub struct JobManager<B: JobCacheBackend, D: JobExecutorDriver> {
    cache: Arc<JobCache<B>>,
    processor: Arc<JobProcessor<D>>,
    config: JobManagerConfig,
}

impl<B: JobCacheBackend + 'static, D: JobExecutorDriver> JobManager<B, D> {
    pub fn new(cache: Arc<JobCache<B>>, processor: Arc<JobProcessor<D>>, config: JobManagerConfig) -> Self {
        Self { cache, processor, config }
    }

    /// Advances every outstanding job by one tenant, one sweep. Returns
    /// how many entries were examined.
    #[instrument(skip(self, tenant, principal), fields(tenant = %tenant.code()))]
    pub async fn sweep_once(&self, tenant: &TenantContext, principal: &Principal) -> Result<usize, TracError> {
        let query = StatusQuery { statuses: non_terminal_statuses(), include_open_tickets: false };
        let entries = self
            .cache
            .query_status(tenant, query)
            .await
            .map_err(TracError::from)?;

        let mut examined = 0;
        for entry in entries {
            examined += 1;
            if let Err(e) = self.advance_one(tenant, principal, &entry.key, entry.revision).await {
                warn!(key = %entry.key, error = %e, "job advance failed");
            }
        }
        Ok(examined)
    }

    async fn advance_one(
        &self,
        tenant: &TenantContext,
        principal: &Principal,
        key: &CacheKey,
        revision: u64,
    ) -> Result<(), TracError> {
        let ticket = self
            .cache
            .open_ticket(tenant, key, revision, self.config.ticket_duration)
            .await
            .map_err(TracError::from)?;
        if ticket.superseded || ticket.missing {
            debug!(key = %key, "skipping: ticket unavailable");
            return Ok(());
        }

        let entry = self
            .cache
            .get_entry(tenant, key, ReadMode::HeldTicket { ticket: ticket.clone() })
            .await
            .map_err(TracError::from)?;

        let record: JobRecord = serde_json::from_value(entry.value)
            .map_err(|e| TracError::internal(format!("malformed job record for {key}: {e}")))?;

        let outcome = self.processor.step(tenant, principal, record).await;

        match outcome {
            Ok(StepOutcome::Advanced(record)) => {
                let value = serde_json::to_value(&record).map_err(TracError::from)?;
                self.cache
                    .update_entry(tenant, &ticket, record.state.as_str(), value)
                    .await
                    .map_err(TracError::from)?;
            }
            Ok(StepOutcome::Finalized(_record)) => {
                self.cache
                    .remove_entry(tenant, &ticket)
                    .await
                    .map_err(TracError::from)?;
                return Ok(());
            }
            Err(e) => {
                error!(key = %key, error = %e, "step failed");
                self.cache
                    .close_ticket(tenant, &ticket)
                    .await
                    .map_err(TracError::from)?;
                return Err(e);
            }
        }

        self.cache
            .close_ticket(tenant, &ticket)
            .await
            .map_err(TracError::from)?;
        Ok(())
    }

    /// Runs sweeps on `config.poll_interval` until `shutdown` fires.
    pub async fn run(&self, tenant: TenantContext, principal: Principal, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(&tenant, &principal).await {
                        error!(error = %e, "sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("job manager shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use trac_executor::{ExecutionResult, ExecutorStatus, JobSpec, LogChunk, PollOutcome, SandboxConfig};
    use trac_queue::MemoryJobCache;
    use trac_types::Value;

    use crate::lookup::MetadataLookup;
    use crate::types::JobDefinition;

    struct AlwaysExistsLookup;

    #[async_trait]
    impl MetadataLookup for AlwaysExistsLookup {
        async fn exists(&self, _tenant: &TenantContext, _object_id: &str) -> Result<bool, TracError> {
            Ok(true)
        }
        async fn write_result(
            &self,
            _tenant: &TenantContext,
            _principal: &Principal,
            _definition: serde_json::Value,
            _attrs: BTreeMap<String, Value>,
        ) -> Result<String, TracError> {
            Ok("result-1".to_string())
        }
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct FakeState {
        calls: u32,
    }

    struct InstantSuccessExecutor {
        polls: AtomicU32,
    }

    #[async_trait]
    impl JobExecutorDriver for InstantSuccessExecutor {
        type State = FakeState;

        async fn submit(&self, _job_key: &str, _spec: &JobSpec, _sandbox: &SandboxConfig) -> Result<Self::State, TracError> {
            Ok(FakeState { calls: 0 })
        }

        async fn poll(&self, _state: &Self::State) -> Result<PollOutcome, TracError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(PollOutcome::new(ExecutorStatus::Running))
            } else {
                Ok(PollOutcome::new(ExecutorStatus::Succeeded))
            }
        }

        async fn cancel(&self, _state: &Self::State) -> Result<(), TracError> {
            Ok(())
        }

        async fn fetch_result(&self, _state: &Self::State) -> Result<ExecutionResult, TracError> {
            Ok(ExecutionResult { result_metadata: serde_json::json!({"ok": true}), outputs: vec![] })
        }

        async fn fetch_logs(&self, _state: &Self::State, _from_seq: u64) -> Result<Vec<LogChunk>, TracError> {
            Ok(vec![])
        }
    }

    fn tenant() -> TenantContext {
        TenantContext::new("acme")
    }

    fn principal() -> Principal {
        Principal { user_id: "u1".to_string(), user_name: "Test User".to_string() }
    }

    async fn seed_job(cache: &JobCache<MemoryJobCache>, tenant: &TenantContext, job_id: &str) {
        let key = CacheKey::from(job_id.to_string());
        let ticket = cache.open_new_ticket(tenant, &key, None).await.unwrap();
        let record = JobRecord::new(job_id, JobDefinition { target: "model-1".to_string(), ..Default::default() });
        let value = serde_json::to_value(&record).unwrap();
        cache.add_entry(tenant, &ticket, record.state.as_str(), value).await.unwrap();
        cache.close_ticket(tenant, &ticket).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_advances_a_job_one_step_at_a_time() {
        let cache = Arc::new(JobCache::new(MemoryJobCache::new()));
        let t = tenant();
        seed_job(&cache, &t, "job-1").await;

        let executor = Arc::new(InstantSuccessExecutor { polls: AtomicU32::new(0) });
        let processor = Arc::new(JobProcessor::new(executor, Arc::new(AlwaysExistsLookup)));
        let manager = JobManager::new(cache.clone(), processor, JobManagerConfig::default());

        manager.sweep_once(&t, &principal()).await.unwrap();
        let entry = cache.get_entry(&t, &CacheKey::from("job-1"), ReadMode::Latest).await.unwrap();
        assert_eq!(entry.status, "VALIDATED");

        manager.sweep_once(&t, &principal()).await.unwrap();
        let entry = cache.get_entry(&t, &CacheKey::from("job-1"), ReadMode::Latest).await.unwrap();
        assert_eq!(entry.status, "QUEUED");
    }

    #[tokio::test]
    async fn job_is_removed_from_cache_once_finalized() {
        let cache = Arc::new(JobCache::new(MemoryJobCache::new()));
        let t = tenant();
        seed_job(&cache, &t, "job-done").await;

        let executor = Arc::new(InstantSuccessExecutor { polls: AtomicU32::new(0) });
        let processor = Arc::new(JobProcessor::new(executor, Arc::new(AlwaysExistsLookup)));
        let manager = JobManager::new(cache.clone(), processor, JobManagerConfig::default());

        // CREATED -> VALIDATED -> QUEUED -> SUBMITTED -> RUNNING -> FINISHING -> COMPLETED
        for _ in 0..6 {
            manager.sweep_once(&t, &principal()).await.unwrap();
        }

        let result = cache.get_entry(&t, &CacheKey::from("job-done"), ReadMode::Latest).await;
        assert!(result.is_err(), "finalized job should have been removed from the cache");
    }
}
