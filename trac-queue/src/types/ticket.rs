use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key a cache entry lives under (spec.md §4.5). Typically a job id
/// minted by the orchestrator, but the cache itself is key-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque handle naming one grant of cooperative exclusion over a key.
/// Whether that grant is actually usable is carried by `Ticket`, not by
/// the handle itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketHandle(pub String);

impl TicketHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TicketHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TicketHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// `{key, revision, grantTime, expiry, superseded, missing}` from
/// spec.md §4.5. A ticket is either a genuine grant held by the caller,
/// or one of two sentinels returned in place of a grant:
/// - `superseded`: another ticket for this key is currently held
/// - `missing`: the key does not exist (only from `openTicket`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub handle: TicketHandle,
    pub key: CacheKey,
    pub revision: u64,
    pub grant_time: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub superseded: bool,
    pub missing: bool,
}

impl Ticket {
    pub fn held(key: CacheKey, revision: u64, duration: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            handle: TicketHandle::new(),
            key,
            revision,
            grant_time: now,
            expiry: now + duration,
            superseded: false,
            missing: false,
        }
    }

    pub fn superseded_sentinel(key: CacheKey) -> Self {
        let now = Utc::now();
        Self {
            handle: TicketHandle::new(),
            key,
            revision: 0,
            grant_time: now,
            expiry: now,
            superseded: true,
            missing: false,
        }
    }

    pub fn missing_sentinel(key: CacheKey) -> Self {
        let now = Utc::now();
        Self {
            handle: TicketHandle::new(),
            key,
            revision: 0,
            grant_time: now,
            expiry: now,
            superseded: false,
            missing: true,
        }
    }

    /// A genuine, still-live grant — not a sentinel, not past its bounded
    /// lifetime.
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        !self.superseded && !self.missing && self.expiry > now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Bounded ticket lifetime (spec.md §4.5): default 30s, hard max 5min.
pub const DEFAULT_TICKET_DURATION_SECS: i64 = 30;
pub const MAX_TICKET_DURATION_SECS: i64 = 300;

pub fn clamp_ticket_duration(requested: Option<chrono::Duration>) -> chrono::Duration {
    let max = chrono::Duration::seconds(MAX_TICKET_DURATION_SECS);
    match requested {
        Some(d) if d > chrono::Duration::zero() => d.min(max),
        _ => chrono::Duration::seconds(DEFAULT_TICKET_DURATION_SECS),
    }
}
