//! REST<->gRPC bridge (spec.md §4.10). Generalizes
//! `dog_axum::rest::service_router`'s per-verb handler dispatch
//! (GET/POST/PUT/PATCH/DELETE -> find/create/update/patch/remove) into a
//! declarative `{httpMethod, uriPattern, grpcMethod}` table driving one
//! generic handler, rather than one handler per CRUD verb.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use trac_core::grpc_code_to_http;

/// One entry in the declarative REST<->gRPC mapping table (spec.md
/// §4.10). `uri_pattern` is a path template with `{var}` placeholders
/// mapped to request-message field paths; `body_field` names the
/// message field the JSON request body is unpacked into (`None` means
/// the whole body maps onto the top-level message).
#[derive(Debug, Clone)]
pub struct RestMapping {
    pub http_method: Method,
    pub uri_pattern: String,
    pub grpc_method: String,
    pub body_field: Option<String>,
    /// Top-level body field names this mapping accepts when
    /// `body_field` is `None` (the body is unpacked directly onto the
    /// message). Any other top-level field in the body is rejected with
    /// a 400 rather than silently forwarded (spec.md §4.10).
    pub known_body_fields: Vec<String>,
}

impl RestMapping {
    pub fn new(http_method: Method, uri_pattern: impl Into<String>, grpc_method: impl Into<String>) -> Self {
        Self {
            http_method,
            uri_pattern: uri_pattern.into(),
            grpc_method: grpc_method.into(),
            body_field: None,
            known_body_fields: Vec::new(),
        }
    }

    pub fn with_body_field(mut self, field: impl Into<String>) -> Self {
        self.body_field = Some(field.into());
        self
    }

    pub fn with_known_body_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_body_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Matches a concrete request path against this mapping's template,
    /// returning the bound `{var}` -> value pairs on success.
    fn bind(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let pattern_segments: Vec<&str> = self.uri_pattern.trim_matches('/').split('/').collect();
        let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if pattern_segments.len() != path_segments.len() {
            return None;
        }

        let mut vars = BTreeMap::new();
        for (pattern, actual) in pattern_segments.iter().zip(path_segments.iter()) {
            if let Some(name) = pattern.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                vars.insert(name.to_string(), actual.to_string());
            } else if pattern != actual {
                return None;
            }
        }
        Some(vars)
    }
}

/// A gRPC call the bridge dispatches to, keeping this crate decoupled
/// from any one service's generated client stubs. The real
/// implementation wraps a `tonic` channel per target; tests use an
/// in-memory fake.
#[async_trait]
pub trait GrpcInvoker: Send + Sync {
    async fn invoke(&self, grpc_method: &str, request: Value) -> Result<Value, tonic::Status>;
}

pub struct RestGateway<I: GrpcInvoker> {
    mappings: Vec<RestMapping>,
    invoker: I,
}

impl<I: GrpcInvoker> RestGateway<I> {
    pub fn new(mappings: Vec<RestMapping>, invoker: I) -> Self {
        Self { mappings, invoker }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = parse_query(req.uri().query().unwrap_or(""));

        let Some(mapping) = self.mappings.iter().find(|m| m.http_method == method).and_then(|m| {
            m.bind(&path).map(|vars| (m, vars))
        }) else {
            return not_found();
        };
        let (mapping, path_vars) = mapping;

        let body_bytes = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return bad_request("failed to read request body"),
        };

        let request_json = match build_request_json(mapping, &path_vars, &query, &body_bytes) {
            Ok(v) => v,
            Err(msg) => return bad_request(&msg),
        };

        match self.invoker.invoke(&mapping.grpc_method, request_json).await {
            Ok(response_json) => json_response(StatusCode::OK, &response_json),
            Err(status) => {
                let code = grpc_code_to_http(status.code());
                let status_code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                json_response(status_code, &serde_json::json!({"message": status.message()}))
            }
        }
    }
}

fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.to_string();
            let value = parts.next().unwrap_or("").to_string();
            Some((key, value))
        })
        .collect()
}

/// Strict decode: unknown top-level body fields are rejected (spec.md
/// §4.10).
fn build_request_json(
    mapping: &RestMapping,
    path_vars: &BTreeMap<String, String>,
    query: &BTreeMap<String, String>,
    body_bytes: &[u8],
) -> Result<Value, String> {
    let mut message = Map::new();
    for (key, value) in path_vars {
        message.insert(key.clone(), Value::String(value.clone()));
    }
    for (key, value) in query {
        message.entry(key.clone()).or_insert_with(|| Value::String(value.clone()));
    }

    if !body_bytes.is_empty() {
        let body: Value = serde_json::from_slice(body_bytes).map_err(|e| format!("invalid JSON body: {e}"))?;
        match (&mapping.body_field, body) {
            (Some(field), body_value) => {
                message.insert(field.clone(), body_value);
            }
            (None, Value::Object(fields)) => {
                for (key, value) in fields {
                    if !mapping.known_body_fields.iter().any(|known| known == &key) {
                        return Err(format!("unknown field '{key}' in request body"));
                    }
                    message.insert(key, value);
                }
            }
            (None, other) => return Err(format!("expected a JSON object body, got {other}")),
        }
    }

    Ok(Value::Object(message))
}

fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("static response is well-formed")
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("connection", "close")
        .body(Body::empty())
        .expect("static response is well-formed")
}

fn bad_request(detail: &str) -> Response<Body> {
    json_response(StatusCode::BAD_REQUEST, &serde_json::json!({"message": detail}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    struct EchoInvoker;

    #[async_trait]
    impl GrpcInvoker for EchoInvoker {
        async fn invoke(&self, grpc_method: &str, request: Value) -> Result<Value, tonic::Status> {
            if grpc_method == "ReadObject" && request.get("id").map(|v| v == "missing").unwrap_or(false) {
                return Err(tonic::Status::not_found("no such object"));
            }
            Ok(serde_json::json!({"echoed": request}))
        }
    }

    fn gateway() -> RestGateway<EchoInvoker> {
        RestGateway::new(
            vec![RestMapping::new(Method::GET, "/objects/{id}", "ReadObject")],
            EchoInvoker,
        )
    }

    #[tokio::test]
    async fn binds_path_variable_and_invokes_mapped_method() {
        let req = Request::builder().method(Method::GET).uri("/objects/abc-123").body(Body::empty()).unwrap();
        let resp = gateway().handle(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unmapped_method_returns_404() {
        let req = Request::builder().method(Method::DELETE).uri("/objects/abc").body(Body::empty()).unwrap();
        let resp = gateway().handle(req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn grpc_not_found_maps_to_http_404() {
        let req = Request::builder().method(Method::GET).uri("/objects/missing").body(Body::empty()).unwrap();
        let resp = gateway().handle(req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_body_is_400() {
        let mappings = vec![RestMapping::new(Method::POST, "/objects", "CreateObject")];
        let gw = RestGateway::new(mappings, EchoInvoker);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/objects")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = gw.handle(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bind_rejects_mismatched_segment_count() {
        let mapping = RestMapping::new(Method::GET, "/objects/{id}", "ReadObject");
        assert!(mapping.bind("/objects/a/b").is_none());
    }

    /// S6: an unknown top-level body field is rejected with 400 rather
    /// than forwarded to the gRPC call.
    #[tokio::test]
    async fn unknown_top_level_body_field_is_rejected() {
        let mappings = vec![RestMapping::new(Method::POST, "/objects", "CreateObject")
            .with_known_body_fields(["name"])];
        let gw = RestGateway::new(mappings, EchoInvoker);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/objects")
            .body(Body::from(serde_json::json!({"name": "a", "extra": "b"}).to_string()))
            .unwrap();
        let resp = gw.handle(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn known_top_level_body_fields_are_accepted() {
        let mappings = vec![RestMapping::new(Method::POST, "/objects", "CreateObject")
            .with_known_body_fields(["name"])];
        let gw = RestGateway::new(mappings, EchoInvoker);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/objects")
            .body(Body::from(serde_json::json!({"name": "a"}).to_string()))
            .unwrap();
        let resp = gw.handle(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
