pub mod memory;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::types::{CacheKey, Entry, Ticket};
use crate::TenantContext;

/// What statuses a caller is asking about, for `query_status`.
pub struct StatusQuery {
    pub statuses: Vec<String>,
    pub include_open_tickets: bool,
}

/// Three ways to read an entry (spec.md §4.5):
pub enum ReadMode {
    /// Must be read by the ticket holder: fails if the ticket is not
    /// currently held (superseded/expired/mismatched).
    HeldTicket { ticket: Ticket },
    /// Read a specific historical revision, regardless of lock state.
    Revision(u64),
    /// Read whatever the latest revision currently is.
    Latest,
}

/// Backend capabilities, mirroring the teacher's capability-flag
/// pattern so callers can probe what a backend supports before relying
/// on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheCapabilities {
    pub transactional: bool,
    pub persistent: bool,
}

/// Storage primitives for the Job Cache (spec.md §4.5). A tenant-scoped,
/// keyed, ticketed, revisioned value store — no notion of executing
/// anything lives here, only of holding and mutating `Entry` records.
#[async_trait]
pub trait JobCacheBackend: Send + Sync {
    /// Grant a new ticket for `key`, creating the entry at revision 0 if
    /// it does not already exist. If a live ticket is already held for
    /// `key`, returns a `superseded` sentinel ticket instead of an error
    /// (spec.md §4.5 scenario S5).
    async fn open_new_ticket(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        duration: chrono::Duration,
    ) -> CacheResult<Ticket>;

    /// Grant a ticket for an existing `key`, as a compare-and-swap on the
    /// caller's last-known `revision` (spec.md §4.5: `openTicket(key,
    /// revision, dur)` grants only when `entry.revision == revision`).
    /// Returns a `missing` sentinel if the key does not exist, or a
    /// `superseded` sentinel if another ticket is currently held or the
    /// entry has since moved past `revision`.
    async fn open_ticket(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        revision: u64,
        duration: chrono::Duration,
    ) -> CacheResult<Ticket>;

    /// Release a held ticket early. No-op (not an error) if the ticket
    /// has already expired or been superseded.
    async fn close_ticket(&self, tenant: &TenantContext, ticket: &Ticket) -> CacheResult<()>;

    /// Add a brand-new entry's value under the ticket's key. Requires
    /// the ticket to still be held and the entry to be at revision 0.
    async fn add_entry(
        &self,
        tenant: &TenantContext,
        ticket: &Ticket,
        status: String,
        value: serde_json::Value,
    ) -> CacheResult<Entry>;

    /// Update an existing entry's value/status. Requires the ticket to
    /// still be held; bumps the revision.
    async fn update_entry(
        &self,
        tenant: &TenantContext,
        ticket: &Ticket,
        status: String,
        value: serde_json::Value,
    ) -> CacheResult<Entry>;

    /// Remove an entry outright. Requires the ticket to still be held.
    async fn remove_entry(&self, tenant: &TenantContext, ticket: &Ticket) -> CacheResult<()>;

    /// Read an entry under one of the three read modes.
    async fn get_entry(
        &self,
        tenant: &TenantContext,
        key: &CacheKey,
        mode: ReadMode,
    ) -> CacheResult<Entry>;

    /// List entries matching a status filter, optionally including
    /// entries that currently have an open (live) ticket.
    async fn query_status(
        &self,
        tenant: &TenantContext,
        query: StatusQuery,
    ) -> CacheResult<Vec<Entry>>;

    fn capabilities(&self) -> CacheCapabilities;
}
