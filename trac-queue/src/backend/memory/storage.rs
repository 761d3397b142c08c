use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::backend::{CacheCapabilities, JobCacheBackend, ReadMode, StatusQuery};
use crate::error::{CacheError, CacheResult};
use crate::types::{CacheKey, Entry, Ticket};
use crate::TenantContext;

type TenantKey = (String, String);

/// In-memory `JobCacheBackend`, scoped per tenant. Each key's `Entry`
/// lives behind the same `RwLock` granularity the teacher used for its
/// job records, so a write to one key never blocks a read of another.
pub struct MemoryJobCache {
    entries: Arc<RwLock<HashMap<TenantKey, Entry>>>,
}

impl MemoryJobCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn scoped(tenant: &TenantContext, key: &CacheKey) -> TenantKey {
        (tenant.code().to_string(), key.as_str().to_string())
    }

    /// Reap every ticket that has passed its expiry, clearing the lock
    /// so a new `openNewTicket`/`openTicket` can proceed. Called by the
    /// background reaper task and also inline before any ticket check,
    /// so a read never has to wait on the reaper's tick.
    pub fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let mut reaped = 0;
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            if let Some(ticket) = &entry.ticket {
                if ticket.is_expired(now) {
                    entry.ticket = None;
                    reaped += 1;
                }
            }
        }
        reaped
    }
}

impl Default for MemoryJobCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobCacheBackend for MemoryJobCache {
    async fn open_new_ticket(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        duration: chrono::Duration,
    ) -> CacheResult<Ticket> {
        let now = Utc::now();
        let scoped = Self::scoped(tenant, key);
        let mut entries = self.entries.write();

        let entry = entries
            .entry(scoped)
            .or_insert_with(|| Entry::new(key.clone(), "new", serde_json::Value::Null));

        // "First write only": once a value has been committed under this
        // key (or it is currently locked), a second openNewTicket is
        // superseded rather than granted, even though the key is
        // unlocked in the committed-but-closed case.
        let already_committed = entry.revision != 0 || entry.status != "new";
        if entry.is_locked(now) || already_committed {
            return Ok(Ticket::superseded_sentinel(key.clone()));
        }

        let ticket = Ticket::held(key.clone(), entry.revision, duration);
        entry.ticket = Some(ticket.clone());
        entry.touch();
        Ok(ticket)
    }

    async fn open_ticket(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        revision: u64,
        duration: chrono::Duration,
    ) -> CacheResult<Ticket> {
        let now = Utc::now();
        let scoped = Self::scoped(tenant, key);
        let mut entries = self.entries.write();

        let Some(entry) = entries.get_mut(&scoped) else {
            return Ok(Ticket::missing_sentinel(key.clone()));
        };

        if entry.is_locked(now) {
            return Ok(Ticket::superseded_sentinel(key.clone()));
        }

        if entry.revision != revision {
            return Ok(Ticket::superseded_sentinel(key.clone()));
        }

        let ticket = Ticket::held(key.clone(), entry.revision, duration);
        entry.ticket = Some(ticket.clone());
        entry.touch();
        Ok(ticket)
    }

    async fn close_ticket(&self, tenant: &TenantContext, ticket: &Ticket) -> CacheResult<()> {
        let scoped = Self::scoped(tenant, &ticket.key);
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&scoped) {
            if matches!(&entry.ticket, Some(held) if held.handle == ticket.handle) {
                entry.ticket = None;
                entry.touch();
            }
        }
        Ok(())
    }

    async fn add_entry(
        &self,
        tenant: &TenantContext,
        ticket: &Ticket,
        status: String,
        value: serde_json::Value,
    ) -> CacheResult<Entry> {
        let now = Utc::now();
        let scoped = Self::scoped(tenant, &ticket.key);
        let mut entries = self.entries.write();

        let entry = entries
            .get_mut(&scoped)
            .ok_or_else(|| CacheError::EntryNotFound(ticket.key.to_string()))?;

        check_ticket_held(entry, ticket, now)?;

        if entry.revision != 0 || entry.status != "new" {
            return Err(CacheError::EntryAlreadyExists(ticket.key.to_string()));
        }

        entry.status = status;
        entry.value = value;
        entry.touch();
        Ok(entry.clone())
    }

    async fn update_entry(
        &self,
        tenant: &TenantContext,
        ticket: &Ticket,
        status: String,
        value: serde_json::Value,
    ) -> CacheResult<Entry> {
        let now = Utc::now();
        let scoped = Self::scoped(tenant, &ticket.key);
        let mut entries = self.entries.write();

        let entry = entries
            .get_mut(&scoped)
            .ok_or_else(|| CacheError::EntryNotFound(ticket.key.to_string()))?;

        check_ticket_held(entry, ticket, now)?;

        entry.status = status;
        entry.value = value;
        entry.bump_revision();
        Ok(entry.clone())
    }

    async fn remove_entry(&self, tenant: &TenantContext, ticket: &Ticket) -> CacheResult<()> {
        let now = Utc::now();
        let scoped = Self::scoped(tenant, &ticket.key);
        let mut entries = self.entries.write();

        let entry = entries
            .get(&scoped)
            .ok_or_else(|| CacheError::EntryNotFound(ticket.key.to_string()))?;
        check_ticket_held(entry, ticket, now)?;

        entries.remove(&scoped);
        Ok(())
    }

    async fn get_entry(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        mode: ReadMode,
    ) -> CacheResult<Entry> {
        let now = Utc::now();
        let scoped = Self::scoped(tenant, key);
        let entries = self.entries.read();

        let entry = entries
            .get(&scoped)
            .ok_or_else(|| CacheError::EntryNotFound(key.to_string()))?;

        match mode {
            ReadMode::Latest => Ok(entry.clone()),
            ReadMode::Revision(rev) => {
                if entry.revision != rev {
                    return Err(CacheError::RevisionMismatch {
                        key: key.to_string(),
                        expected: rev,
                        found: entry.revision,
                    });
                }
                Ok(entry.clone())
            }
            ReadMode::HeldTicket { ticket } => {
                check_ticket_held(entry, &ticket, now)?;
                Ok(entry.clone())
            }
        }
    }

    async fn query_status(
        &self,
        tenant: &TenantContext,
        query: StatusQuery,
    ) -> CacheResult<Vec<Entry>> {
        let now = Utc::now();
        let entries = self.entries.read();
        let tenant_code = tenant.code();

        Ok(entries
            .iter()
            .filter(|((t, _), _)| t == tenant_code)
            .map(|(_, e)| e)
            .filter(|e| query.statuses.is_empty() || query.statuses.contains(&e.status))
            .filter(|e| query.include_open_tickets || !e.is_locked(now))
            .cloned()
            .collect())
    }

    fn capabilities(&self) -> CacheCapabilities {
        CacheCapabilities {
            transactional: false,
            persistent: false,
        }
    }
}

fn check_ticket_held(
    entry: &Entry,
    ticket: &Ticket,
    now: chrono::DateTime<Utc>,
) -> CacheResult<()> {
    match &entry.ticket {
        Some(held) if held.handle == ticket.handle => {
            if held.is_expired(now) {
                Err(CacheError::TicketExpired(ticket.key.to_string()))
            } else {
                Ok(())
            }
        }
        Some(_) => Err(CacheError::TicketSuperseded(ticket.key.to_string())),
        None => Err(CacheError::TicketMismatch(ticket.key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantContext {
        TenantContext::new("acme")
    }

    #[tokio::test]
    async fn open_new_ticket_then_add_then_read() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("job-1");
        let t = tenant();

        let ticket = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(!ticket.superseded && !ticket.missing);

        let entry = cache
            .add_entry(&t, &ticket, "running".into(), serde_json::json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(entry.revision, 0);
        assert_eq!(entry.status, "running");

        cache.close_ticket(&t, &ticket).await.unwrap();

        let read = cache
            .get_entry(&t, &key, ReadMode::Latest)
            .await
            .unwrap();
        assert_eq!(read.status, "running");
    }

    #[tokio::test]
    async fn second_ticket_while_held_is_superseded() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("job-2");
        let t = tenant();

        let _first = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();

        let second = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(second.superseded);
    }

    #[tokio::test]
    async fn open_ticket_on_missing_key_returns_missing_sentinel() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("nope");
        let t = tenant();

        let ticket = cache
            .open_ticket(&t, &key, 0, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(ticket.missing);
    }

    #[tokio::test]
    async fn open_ticket_rejects_a_stale_revision() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("job-revcas");
        let t = tenant();

        let ticket = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        cache
            .add_entry(&t, &ticket, "running".into(), serde_json::json!({}))
            .await
            .unwrap();
        cache.close_ticket(&t, &ticket).await.unwrap();

        // Entry is at revision 0; a caller holding a stale revision 5
        // view is superseded rather than granted a ticket.
        let stale = cache
            .open_ticket(&t, &key, 5, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(stale.superseded);

        let current = cache
            .open_ticket(&t, &key, 0, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(!current.superseded && !current.missing);
    }

    #[tokio::test]
    async fn open_new_ticket_supersedes_once_a_value_was_committed_and_closed() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("job-committed");
        let t = tenant();

        let first = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        cache
            .add_entry(&t, &first, "running".into(), serde_json::json!({}))
            .await
            .unwrap();
        cache.close_ticket(&t, &first).await.unwrap();

        // Key is unlocked again, but a value was already committed to
        // it -> openNewTicket must supersede, not grant a fresh ticket.
        let second = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(second.superseded);
    }

    #[tokio::test]
    async fn expired_ticket_is_reaped_and_unlocks_key() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("job-3");
        let t = tenant();

        let ticket = cache
            .open_new_ticket(&t, &key, chrono::Duration::milliseconds(-1))
            .await
            .unwrap();
        assert!(!ticket.superseded);

        let reaped = cache.reap_expired();
        assert_eq!(reaped, 1);

        let fresh = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(!fresh.superseded);
    }

    #[tokio::test]
    async fn update_entry_bumps_revision() {
        let cache = MemoryJobCache::new();
        let key = CacheKey::from("job-4");
        let t = tenant();

        let ticket = cache
            .open_new_ticket(&t, &key, chrono::Duration::seconds(30))
            .await
            .unwrap();
        cache
            .add_entry(&t, &ticket, "running".into(), serde_json::json!({}))
            .await
            .unwrap();

        let updated = cache
            .update_entry(&t, &ticket, "done".into(), serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(updated.revision, 1);
        assert_eq!(updated.status, "done");
    }
}
