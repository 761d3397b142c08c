use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::backend::{CacheCapabilities, JobCacheBackend, ReadMode, StatusQuery};
use crate::error::CacheResult;
use crate::types::{clamp_ticket_duration, CacheKey, Entry, Ticket};
use crate::TenantContext;

/// Configuration for the Job Cache wrapper, mirroring the teacher's
/// adapter-level config pattern.
#[derive(Debug, Clone)]
pub struct JobCacheConfig {
    /// Default ticket lifetime when a caller does not request one.
    pub default_ticket_duration: Duration,
    /// Hard ceiling on ticket lifetime, regardless of request.
    pub max_ticket_duration: Duration,
    /// How often the background reaper sweeps for expired tickets.
    pub reaper_interval: Duration,
}

impl Default for JobCacheConfig {
    fn default() -> Self {
        Self {
            default_ticket_duration: Duration::from_secs(
                crate::types::DEFAULT_TICKET_DURATION_SECS as u64,
            ),
            max_ticket_duration: Duration::from_secs(crate::types::MAX_TICKET_DURATION_SECS as u64),
            reaper_interval: Duration::from_secs(5),
        }
    }
}

/// Thin wrapper over a `JobCacheBackend` that exposes the spec's
/// operation names directly and applies ticket-duration policy
/// (spec.md §4.5).
pub struct JobCache<B: JobCacheBackend + ?Sized> {
    backend: Arc<B>,
    config: JobCacheConfig,
}

impl<B: JobCacheBackend + Send + Sync + 'static> JobCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            config: JobCacheConfig::default(),
        }
    }

    pub fn with_config(backend: B, config: JobCacheConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    fn clamp(&self, requested: Option<Duration>) -> chrono::Duration {
        let requested = requested
            .map(|d| chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero()));
        let clamped = clamp_ticket_duration(requested);
        let max = chrono::Duration::from_std(self.config.max_ticket_duration)
            .unwrap_or(clamped);
        clamped.min(max)
    }

    #[instrument(skip(self), fields(tenant = %tenant.code(), key = %key))]
    pub async fn open_new_ticket(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        duration: Option<Duration>,
    ) -> CacheResult<Ticket> {
        let dur = self.clamp(duration);
        let ticket = self.backend.open_new_ticket(tenant, key, dur).await?;
        if ticket.superseded {
            info!(%key, "openNewTicket superseded: key already locked");
        }
        Ok(ticket)
    }

    #[instrument(skip(self), fields(tenant = %tenant.code(), key = %key))]
    pub async fn open_ticket(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        revision: u64,
        duration: Option<Duration>,
    ) -> CacheResult<Ticket> {
        let dur = self.clamp(duration);
        self.backend.open_ticket(tenant, key, revision, dur).await
    }

    pub async fn close_ticket(&self, tenant: &TenantContext, ticket: &Ticket) -> CacheResult<()> {
        self.backend.close_ticket(tenant, ticket).await
    }

    pub async fn add_entry(
        &self,
        tenant: &TenantContext,
        ticket: &Ticket,
        status: impl Into<String>,
        value: serde_json::Value,
    ) -> CacheResult<Entry> {
        self.backend
            .add_entry(tenant, ticket, status.into(), value)
            .await
    }

    pub async fn update_entry(
        &self,
        tenant: &TenantContext,
        ticket: &Ticket,
        status: impl Into<String>,
        value: serde_json::Value,
    ) -> CacheResult<Entry> {
        self.backend
            .update_entry(tenant, ticket, status.into(), value)
            .await
    }

    pub async fn remove_entry(&self, tenant: &TenantContext, ticket: &Ticket) -> CacheResult<()> {
        self.backend.remove_entry(tenant, ticket).await
    }

    pub async fn get_entry(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        mode: ReadMode,
    ) -> CacheResult<Entry> {
        self.backend.get_entry(tenant, key, mode).await
    }

    pub async fn query_status(
        &self,
        tenant: &TenantContext,
        query: StatusQuery,
    ) -> CacheResult<Vec<Entry>> {
        self.backend.query_status(tenant, query).await
    }

    pub fn capabilities(&self) -> CacheCapabilities {
        self.backend.capabilities()
    }

    pub fn config(&self) -> &JobCacheConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: JobCacheBackend> Clone for JobCache<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryJobCache;

    fn tenant() -> TenantContext {
        TenantContext::new("acme")
    }

    #[tokio::test]
    async fn adapter_roundtrip() {
        let cache = JobCache::new(MemoryJobCache::new());
        let t = tenant();
        let key = CacheKey::from("job-1");

        let ticket = cache.open_new_ticket(&t, &key, None).await.unwrap();
        let entry = cache
            .add_entry(&t, &ticket, "running", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(entry.revision, 0);

        cache.close_ticket(&t, &ticket).await.unwrap();

        let read = cache.get_entry(&t, &key, ReadMode::Latest).await.unwrap();
        assert_eq!(read.status, "running");
    }

    #[tokio::test]
    async fn ticket_duration_is_clamped_to_max() {
        let cache = JobCache::new(MemoryJobCache::new());
        let t = tenant();
        let key = CacheKey::from("job-2");

        let ticket = cache
            .open_new_ticket(&t, &key, Some(Duration::from_secs(10_000)))
            .await
            .unwrap();
        let lifetime = ticket.expiry - ticket.grant_time;
        assert!(lifetime <= chrono::Duration::seconds(crate::types::MAX_TICKET_DURATION_SECS));
    }
}
