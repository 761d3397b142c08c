//! Background reclamation of expired tickets, so a crashed ticket-holder's
//! lock is eventually released without anyone calling `closeTicket`
//! (spec.md §4.5). Mirrors the teacher's lease-reaper shape: a periodic
//! tick over the backend, running until told to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::backend::memory::MemoryJobCache;

/// Handle controlling a running reaper task.
pub struct ReaperHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
    }
}

/// Spawn a task that reaps expired tickets on `backend` every
/// `interval`, until shut down.
#[instrument(skip(backend))]
pub fn spawn_ticket_reaper(backend: Arc<MemoryJobCache>, interval: Duration) -> ReaperHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let join_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("ticket reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let reaped = backend.reap_expired();
                    if reaped > 0 {
                        debug!(reaped, "reclaimed expired tickets");
                    }
                }
            }
        }
    });

    ReaperHandle {
        shutdown_tx,
        join_handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::JobCacheBackend;
    use crate::types::CacheKey;
    use crate::TenantContext;

    #[tokio::test]
    async fn reaper_reclaims_expired_ticket_on_tick() {
        let backend = Arc::new(MemoryJobCache::new());
        let tenant = TenantContext::new("acme");
        let key = CacheKey::from("job-reap");

        let ticket = backend
            .open_new_ticket(&tenant, &key, chrono::Duration::milliseconds(-1))
            .await
            .unwrap();
        assert!(!ticket.superseded);

        let handle = spawn_ticket_reaper(backend.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        let fresh = backend
            .open_new_ticket(&tenant, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(!fresh.superseded);
    }
}
