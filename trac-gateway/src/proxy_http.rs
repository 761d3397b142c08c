//! HTTP/1 transparent proxy (spec.md §4.10). Opens a pooled connection
//! to the route's target, forwards headers and body, rewrites `Host`,
//! strips hop-by-hop headers. Upstream connection failure surfaces as
//! `502 Bad Gateway`.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::router::RouteTarget;

/// Request headers never forwarded as-is to the next hop (spec.md
/// §4.10).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "proxy-authorization",
    "upgrade",
];

#[derive(Clone)]
pub struct HttpProxy {
    client: Client<HttpConnector, Body>,
}

impl Default for HttpProxy {
    fn default() -> Self {
        Self { client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()) }
    }
}

impl HttpProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn forward(&self, target: &RouteTarget, req: Request<Body>) -> Response<Body> {
        match self.try_forward(target, req).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, target = %target.authority(), "upstream HTTP proxy failure");
                bad_gateway()
            }
        }
    }

    async fn try_forward(&self, target: &RouteTarget, req: Request<Body>) -> anyhow::Result<Response<Body>> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = format!("{}://{}{}", target.scheme, target.authority(), join_path(&target.path, path_and_query));
        parts.uri = uri.parse()?;

        strip_hop_by_hop(&mut parts.headers);
        if let Ok(host) = HeaderValue::from_str(&target.authority()) {
            parts.headers.insert(HeaderName::from_static("host"), host);
        }

        let upstream_req = Request::from_parts(parts, body);
        let resp = self.client.request(upstream_req).await?;

        let (mut resp_parts, resp_body) = resp.into_parts();
        strip_hop_by_hop(&mut resp_parts.headers);
        let bytes: Bytes = resp_body.collect().await?.to_bytes();
        Ok(Response::from_parts(resp_parts, Body::from(bytes)))
    }
}

fn join_path(route_path: &str, request_path_and_query: &str) -> String {
    let base = route_path.trim_end_matches('/');
    format!("{base}{request_path_and_query}")
}

fn strip_hop_by_hop(headers: &mut axum::http::HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn bad_gateway() -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .body(Body::from("bad gateway"))
        .expect("static response is well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_concatenates_without_double_slash() {
        assert_eq!(join_path("/api/", "/v1/objects"), "/api/v1/objects");
        assert_eq!(join_path("/api", "/v1/objects?x=1"), "/api/v1/objects?x=1");
    }

    #[test]
    fn strip_hop_by_hop_removes_all_listed_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("upgrade", HeaderValue::from_static("h2c"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        strip_hop_by_hop(&mut headers);
        assert!(headers.get("connection").is_none());
        assert!(headers.get("upgrade").is_none());
        assert!(headers.get("x-request-id").is_some());
    }
}
