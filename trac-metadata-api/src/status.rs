//! `anyhow::Error` → `tonic::Status`, the gRPC-surface equivalent of
//! `dog_axum::error::DogAxumError`'s HTTP `IntoResponse` impl: preserve
//! a `TracError`'s kind/message if present, sanitize internal detail
//! behind a correlation id, and fall back to `Internal` for anything
//! else.

use tonic::Status;
use trac_core::TracError;
use uuid::Uuid;

pub fn to_status(err: anyhow::Error) -> Status {
    let correlation_id = Uuid::new_v4().to_string();
    let trac = TracError::normalize(err);
    let safe = trac.sanitize_for_client(&correlation_id);
    if matches!(trac.kind, trac_core::TracErrorKind::Internal) {
        tracing::error!(correlation_id = %correlation_id, detail = %trac.message, "internal error in metadata API");
    }
    Status::new(safe.grpc_code(), safe.message)
}
