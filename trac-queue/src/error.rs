use thiserror::Error;
use trac_core::{TracError, TracErrorKind};

/// Result type for Job Cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Infrastructure errors for the Job Cache (spec.md §4.5).
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("entry already exists: {0}")]
    EntryAlreadyExists(String),

    #[error("ticket superseded: another ticket is held for key {0}")]
    TicketSuperseded(String),

    #[error("ticket expired for key {0}")]
    TicketExpired(String),

    #[error("ticket does not match the entry's current ticket for key {0}")]
    TicketMismatch(String),

    #[error("revision mismatch for key {key}: expected {expected}, found {found}")]
    RevisionMismatch {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("backend does not support feature: {0}")]
    BackendUnsupported(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<CacheError> for TracError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::EntryNotFound(k) => {
                TracError::cache_not_found(format!("no cache entry for key '{k}'"))
            }
            CacheError::EntryAlreadyExists(k) => {
                TracError::already_exists(format!("cache entry already exists for key '{k}'"))
            }
            CacheError::TicketSuperseded(k) => {
                TracError::cache_ticket(format!("ticket for key '{k}' has been superseded"))
            }
            CacheError::TicketExpired(k) => {
                TracError::cache_ticket(format!("ticket for key '{k}' has expired"))
            }
            CacheError::TicketMismatch(k) => {
                TracError::cache_ticket(format!("ticket does not match current holder for key '{k}'"))
            }
            CacheError::RevisionMismatch {
                key,
                expected,
                found,
            } => TracError::version_conflict(format!(
                "revision mismatch for key '{key}': expected {expected}, found {found}"
            )),
            CacheError::BackendUnsupported(what) => {
                TracError::new(TracErrorKind::Internal, format!("unsupported: {what}"))
            }
            CacheError::SerializationError(msg) => {
                TracError::new(TracErrorKind::Internal, format!("serialization error: {msg}"))
            }
            CacheError::Internal(msg) => TracError::internal(msg),
        }
    }
}
