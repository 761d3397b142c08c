//! gRPC passthrough proxy (spec.md §4.10's "HTTP/1<->HTTP/2 framing"
//! section, the GRPC_PROXY protocol class). The gateway terminates
//! HTTP/1 or HTTP/2 from the client and always opens an HTTP/2
//! connection to the gRPC target; each inbound request becomes one
//! HTTP/2 stream on that connection regardless of which protocol the
//! client spoke, so a single forwarder serves both framing directions.
//!
//! Grounded on `proxy_http::HttpProxy`'s shape, swapped to an h2-only
//! connector (`hyper_util::client::legacy`'s HTTP/2-only builder) since
//! gRPC requires HTTP/2 end to end.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::router::RouteTarget;

#[derive(Clone)]
pub struct GrpcProxy {
    client: Client<HttpConnector, Body>,
}

impl Default for GrpcProxy {
    fn default() -> Self {
        // `.force_http2` takes effect once the connector is wired to
        // pool purely HTTP/2 connections, one per upstream authority.
        Self { client: Client::builder(TokioExecutor::new()).http2_only(true).build(HttpConnector::new()) }
    }
}

impl GrpcProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards one gRPC request as a fresh HTTP/2 stream on the proxy's
    /// connection to `target`. Client disconnect cancels the axum
    /// request future, which cancels this in-flight `request` call and,
    /// through it, the h2 stream to the upstream (spec.md §4.8).
    pub async fn forward(&self, target: &RouteTarget, req: Request<Body>) -> Response<Body> {
        match self.try_forward(target, req).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, target = %target.authority(), "upstream gRPC proxy failure");
                unavailable()
            }
        }
    }

    async fn try_forward(&self, target: &RouteTarget, req: Request<Body>) -> anyhow::Result<Response<Body>> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        parts.uri = format!("{}://{}{}", target.scheme, target.authority(), path_and_query).parse()?;
        if let Ok(authority) = HeaderValue::from_str(&target.authority()) {
            parts.headers.insert(HeaderName::from_static("host"), authority);
        }

        let upstream_req = Request::from_parts(parts, body);
        let resp = self.client.request(upstream_req).await?;

        let (resp_parts, resp_body) = resp.into_parts();
        let bytes: Bytes = resp_body.collect().await?.to_bytes();
        Ok(Response::from_parts(resp_parts, Body::from(bytes)))
    }
}

fn unavailable() -> Response<Body> {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .body(Body::from("upstream gRPC target unavailable"))
        .expect("static response is well-formed")
}
