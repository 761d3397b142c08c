//! The `INTERNAL` protocol class's one standing route: a liveness check
//! nested at whatever prefix the deployment configures (conventionally
//! `/health`).

use axum::{routing::get, Json, Router};
use serde_json::json;

pub fn router() -> Router<()> {
    Router::new().route("/", get(|| async { Json(json!({"status": "ok"})) }))
}
