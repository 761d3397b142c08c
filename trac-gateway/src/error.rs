//! `anyhow::Error` → Axum `Response`, the gateway-local counterpart of
//! `dog_axum::error::DogAxumError`: preserve a `TracError`'s kind if
//! present, sanitize behind a correlation id, map through
//! `trac_core::grpc_code_to_http`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use trac_core::TracError;
use uuid::Uuid;

#[derive(Debug)]
pub struct GatewayError(pub anyhow::Error);

impl From<anyhow::Error> for GatewayError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let trac = TracError::normalize(self.0);
        let safe = trac.sanitize_for_client(&correlation_id);
        let status = StatusCode::from_u16(safe.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}
