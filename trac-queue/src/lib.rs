//! trac-queue: the Job Cache (spec.md §4.5).
//!
//! A tenant-scoped, ticketed, revisioned key/value store the orchestrator
//! uses to coordinate job state across workers without a second
//! processing engine underneath it. A ticket grants cooperative mutual
//! exclusion over a key for a bounded lifetime; entries carry an
//! opaque value plus a monotonically increasing revision bumped on
//! every update.
//!
//! This crate holds no notion of *executing* anything — that is
//! `trac-executor`'s job. Here, a key is just a key and a value is just
//! a value.

pub mod adapter;
pub mod backend;
pub mod error;
pub mod reaper;
pub mod types;

pub use adapter::{JobCache, JobCacheConfig};
pub use backend::{CacheCapabilities, JobCacheBackend, ReadMode, StatusQuery};
pub use backend::memory::MemoryJobCache;
pub use error::{CacheError, CacheResult};
pub use reaper::{spawn_ticket_reaper, ReaperHandle};
pub use types::{
    clamp_ticket_duration, CacheKey, Entry, Ticket, TicketHandle, DEFAULT_TICKET_DURATION_SECS,
    MAX_TICKET_DURATION_SECS,
};
pub use trac_core::{TenantContext, TenantId};

pub mod prelude {
    pub use crate::{
        CacheError, CacheKey, CacheResult, Entry, JobCache, JobCacheBackend, JobCacheConfig,
        MemoryJobCache, ReadMode, StatusQuery, Ticket,
    };
    pub use trac_core::TenantContext;
}
