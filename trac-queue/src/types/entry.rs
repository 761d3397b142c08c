use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CacheKey, Ticket};

/// `{key, revision, status, value, lastActivity, ticket}` from spec.md
/// §4.5. The cache stores opaque, caller-defined values under a key,
/// with optimistic-concurrency revisioning and an optional held ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: CacheKey,
    pub revision: u64,
    pub status: String,
    pub value: Value,
    pub last_activity: DateTime<Utc>,

    /// The ticket currently held over this key, if any. `None` means the
    /// key is unlocked and free for `openNewTicket`.
    pub ticket: Option<Ticket>,
}

impl Entry {
    pub fn new(key: CacheKey, status: impl Into<String>, value: Value) -> Self {
        Self {
            key,
            revision: 0,
            status: status.into(),
            value,
            last_activity: Utc::now(),
            ticket: None,
        }
    }

    /// Is a live (non-expired) ticket currently held on this entry?
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(&self.ticket, Some(t) if t.is_held(now))
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
        self.touch();
    }
}
