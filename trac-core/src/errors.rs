//! # Errors
//!
//! A structured error type shared across every TRAC crate. Core goals:
//! - one canonical taxonomy (spec.md §7), not a per-crate guess
//! - can be carried through `anyhow::Error` (for the hook pipeline)
//! - transport-agnostic: the metadata API maps kinds to `tonic::Status`
//!   codes, the gateway maps gRPC codes to HTTP per spec.md §4.10's table
//!
//! If you enable feature `serde`, you also get:
//! - `data` / `errors` as `serde_json::Value`
//! - `to_json()` helper

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for TRAC core APIs.
pub type TracResult<T> = std::result::Result<T, AnyError>;

/// The canonical error taxonomy from spec.md §7. DAL errors, service
/// errors, job cache errors and executor errors all normalize into one
/// of these before crossing a crate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TracErrorKind {
    /// Bad client payload; user-visible detail.
    InvalidInput,
    /// Selector resolves to nothing.
    NotFound,
    /// Id collision or duplicate create.
    AlreadyExists,
    /// Write against a stale `isLatestObject`.
    VersionConflict,
    /// Write against a stale `isLatestTag`.
    TagVersionConflict,
    /// Request type disagrees with stored type.
    WrongObjectType,
    /// Public API asked for a restricted object type.
    PermissionDenied,
    /// Missing or invalid token.
    Unauthenticated,
    /// Ticket expired, superseded, or doesn't match the entry.
    CacheTicket,
    /// Job cache miss.
    CacheNotFound,
    /// Executor failure that is safe to retry.
    ExecutorTransient,
    /// Executor failure that is not safe to retry.
    ExecutorFatal,
    /// Unexpected; logged with detail, surfaced as an opaque code.
    Internal,
}

impl TracErrorKind {
    /// gRPC status code, per spec.md §7's propagation policy (the API
    /// tier maps kinds to these; the gateway then maps gRPC to HTTP).
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            TracErrorKind::InvalidInput => tonic::Code::InvalidArgument,
            TracErrorKind::NotFound => tonic::Code::NotFound,
            TracErrorKind::AlreadyExists => tonic::Code::AlreadyExists,
            TracErrorKind::VersionConflict | TracErrorKind::TagVersionConflict => {
                tonic::Code::FailedPrecondition
            }
            TracErrorKind::WrongObjectType => tonic::Code::InvalidArgument,
            TracErrorKind::PermissionDenied => tonic::Code::PermissionDenied,
            TracErrorKind::Unauthenticated => tonic::Code::Unauthenticated,
            TracErrorKind::CacheTicket => tonic::Code::FailedPrecondition,
            TracErrorKind::CacheNotFound => tonic::Code::NotFound,
            TracErrorKind::ExecutorTransient => tonic::Code::Unavailable,
            TracErrorKind::ExecutorFatal => tonic::Code::Internal,
            TracErrorKind::Internal => tonic::Code::Internal,
        }
    }

    /// HTTP status code, per spec.md §4.10's gRPC→HTTP table.
    pub fn http_status(&self) -> u16 {
        grpc_code_to_http(self.grpc_code())
    }

    pub fn name(&self) -> &'static str {
        match self {
            TracErrorKind::InvalidInput => "InvalidInput",
            TracErrorKind::NotFound => "NotFound",
            TracErrorKind::AlreadyExists => "AlreadyExists",
            TracErrorKind::VersionConflict => "VersionConflict",
            TracErrorKind::TagVersionConflict => "TagVersionConflict",
            TracErrorKind::WrongObjectType => "WrongObjectType",
            TracErrorKind::PermissionDenied => "PermissionDenied",
            TracErrorKind::Unauthenticated => "Unauthenticated",
            TracErrorKind::CacheTicket => "CacheTicket",
            TracErrorKind::CacheNotFound => "CacheNotFound",
            TracErrorKind::ExecutorTransient => "ExecutorTransient",
            TracErrorKind::ExecutorFatal => "ExecutorFatal",
            TracErrorKind::Internal => "Internal",
        }
    }
}

/// gRPC code → HTTP code, per spec.md §4.10. `any other` falls to 500.
pub fn grpc_code_to_http(code: tonic::Code) -> u16 {
    match code {
        tonic::Code::InvalidArgument => 400,
        tonic::Code::Unauthenticated => 401,
        tonic::Code::PermissionDenied => 403,
        tonic::Code::NotFound => 404,
        tonic::Code::AlreadyExists => 409,
        tonic::Code::FailedPrecondition => 412,
        tonic::Code::ResourceExhausted => 429,
        tonic::Code::Unimplemented => 501,
        tonic::Code::Unavailable => 503,
        _ => 500,
    }
}

#[cfg(feature = "serde")]
pub type ErrorValue = serde_json::Value;

#[cfg(not(feature = "serde"))]
pub type ErrorValue = std::sync::Arc<dyn std::any::Any + Send + Sync>;

/// A structured TRAC error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct TracError {
    pub kind: TracErrorKind,
    pub message: String,
    pub data: Option<ErrorValue>,
    pub errors: Option<ErrorValue>,
    pub source: Option<AnyError>,
}

impl TracError {
    pub fn new(kind: TracErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: ErrorValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: ErrorValue) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn grpc_code(&self) -> tonic::Code {
        self.kind.grpc_code()
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Convert into `anyhow::Error` so it flows through the hook pipeline.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `TracError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&TracError> {
        err.downcast_ref::<TracError>()
    }

    /// Turn any error into a TracError:
    /// - if it's already a TracError, keep it (lossless)
    /// - otherwise wrap as Internal
    pub fn normalize(err: AnyError) -> TracError {
        match err.downcast::<TracError>() {
            Ok(traced) => traced,
            Err(other) => {
                TracError::new(TracErrorKind::Internal, other.to_string()).with_source(other)
            }
        }
    }

    /// A "safe" version suitable for returning to clients: keep
    /// kind/message/data/errors, drop the inner `source` (stack/secret
    /// details). `Internal` additionally collapses its message to an
    /// opaque correlation id per spec.md §7.
    pub fn sanitize_for_client(&self, correlation_id: &str) -> TracError {
        let message = if matches!(self.kind, TracErrorKind::Internal) {
            format!("internal error (ref {correlation_id})")
        } else {
            self.message.clone()
        };
        TracError {
            kind: self.kind,
            message,
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    // ---- Constructors ----

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::InvalidInput, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::NotFound, msg)
    }
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::AlreadyExists, msg)
    }
    pub fn version_conflict(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::VersionConflict, msg)
    }
    pub fn tag_version_conflict(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::TagVersionConflict, msg)
    }
    pub fn wrong_object_type(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::WrongObjectType, msg)
    }
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::PermissionDenied, msg)
    }
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::Unauthenticated, msg)
    }
    pub fn cache_ticket(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::CacheTicket, msg)
    }
    pub fn cache_not_found(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::CacheNotFound, msg)
    }
    pub fn executor_transient(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::ExecutorTransient, msg)
    }
    pub fn executor_fatal(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::ExecutorFatal, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(TracErrorKind::Internal, msg)
    }
}

impl fmt::Display for TracError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.http_status(), self.message)
    }
}

impl std::error::Error for TracError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "serde")]
impl TracError {
    /// Feathers-ish JSON payload, used by the gateway's REST↔gRPC bridge.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.http_status(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }
}

/// Convenience helper for "bail with TracError".
#[macro_export]
macro_rules! bail_trac {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::TracError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::TracError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_follows_spec_table() {
        assert_eq!(TracErrorKind::InvalidInput.http_status(), 400);
        assert_eq!(TracErrorKind::Unauthenticated.http_status(), 401);
        assert_eq!(TracErrorKind::PermissionDenied.http_status(), 403);
        assert_eq!(TracErrorKind::NotFound.http_status(), 404);
        assert_eq!(TracErrorKind::AlreadyExists.http_status(), 409);
        assert_eq!(TracErrorKind::VersionConflict.http_status(), 412);
        assert_eq!(TracErrorKind::ExecutorFatal.http_status(), 500);
        assert_eq!(TracErrorKind::ExecutorTransient.http_status(), 503);
    }

    #[test]
    fn normalize_is_lossless_for_trac_errors() {
        let err = TracError::not_found("no such object").into_anyhow();
        let normalized = TracError::normalize(err);
        assert_eq!(normalized.kind, TracErrorKind::NotFound);
    }

    #[test]
    fn sanitize_hides_internal_detail() {
        let err = TracError::internal("pool exhausted: conn refused at 10.0.0.4");
        let safe = err.sanitize_for_client("corr-123");
        assert!(safe.message.contains("corr-123"));
        assert!(!safe.message.contains("10.0.0.4"));
    }
}
