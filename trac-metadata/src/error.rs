use thiserror::Error;
use trac_core::TracError;

pub type DalResult<T> = Result<T, DalError>;

/// DAL-level errors from spec.md §4.2.1's "key errors" column.
#[derive(Error, Debug)]
pub enum DalError {
    #[error("duplicate object: {0}")]
    DuplicateObject(String),

    #[error("missing item: {0}")]
    MissingItem(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("tag version conflict: {0}")]
    TagVersionConflict(String),

    #[error("invalid search: {0}")]
    InvalidSearch(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DalError> for TracError {
    fn from(err: DalError) -> Self {
        match err {
            DalError::DuplicateObject(msg) => TracError::already_exists(msg),
            DalError::MissingItem(msg) => TracError::not_found(msg),
            DalError::VersionConflict(msg) => TracError::version_conflict(msg),
            DalError::TagVersionConflict(msg) => TracError::tag_version_conflict(msg),
            DalError::InvalidSearch(msg) => TracError::invalid_input(msg),
            DalError::Database(e) => TracError::internal(e.to_string()),
            DalError::Internal(msg) => TracError::internal(msg),
        }
    }
}
