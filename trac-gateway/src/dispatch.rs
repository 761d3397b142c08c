//! Ties the route table to the protocol-specific proxies behind one
//! Axum fallback handler — the gateway's single entry point, mirroring
//! how `dog_axum::app::AxumApp` nests one router per service but
//! collapsing it to one data-driven dispatch instead of one handler
//! per route.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::proxy_grpc::GrpcProxy;
use crate::proxy_http::HttpProxy;
use crate::router::{ProtocolClass, RouteTable};

#[derive(Clone)]
pub struct GatewayState {
    routes: Arc<RouteTable>,
    http_proxy: HttpProxy,
    grpc_proxy: GrpcProxy,
}

impl GatewayState {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes: Arc::new(routes), http_proxy: HttpProxy::new(), grpc_proxy: GrpcProxy::new() }
    }
}

/// Builds the gateway's router: `HTTP_PROXY`/`GRPC_PROXY`/`GRPC_WEB`
/// routes are served by the fallback dispatcher driven by the route
/// table; `REST_MAPPED`/`INTERNAL` routes are served by whatever typed
/// router the caller nests at that prefix (the `RestGateway` bridge and
/// the health endpoint respectively) — axum always prefers a matched
/// nested route over `.fallback()`, so those take priority without this
/// crate needing to know their concrete handler types.
pub fn router(state: GatewayState, nested: Vec<(&'static str, Router<()>)>) -> Router<()> {
    let mut router = Router::new().fallback(dispatch);
    for (prefix, sub_router) in nested {
        router = router.nest(prefix, sub_router);
    }
    router.with_state(state)
}

async fn dispatch(State(state): State<GatewayState>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    let Some(route) = state.routes.resolve(&path) else {
        return not_found();
    };

    match route.class {
        ProtocolClass::HttpProxy => state.http_proxy.forward(&route.target, req).await.into_response(),
        ProtocolClass::GrpcProxy | ProtocolClass::GrpcWeb => {
            state.grpc_proxy.forward(&route.target, req).await.into_response()
        }
        // REST_MAPPED and INTERNAL routes are served by the crates that
        // own the declarative mapping table or the health payload; the
        // gateway only guarantees them a match in the route table.
        ProtocolClass::RestMapped | ProtocolClass::Internal => {
            StatusCode::NOT_IMPLEMENTED.into_response()
        }
    }
}

fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("connection", "close")
        .body(Body::empty())
        .expect("static response is well-formed")
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{ProtocolClass, RouteTable, RouteTarget};
    use tower::ServiceExt;

    fn state_with(prefix: &str, class: ProtocolClass) -> GatewayState {
        let mut routes = RouteTable::new();
        routes.register(prefix, class, RouteTarget::new("http", "127.0.0.1", 9, "/"));
        GatewayState::new(routes)
    }

    #[tokio::test]
    async fn unmatched_path_returns_404_with_connection_close() {
        let app = router(state_with("metadata", ProtocolClass::GrpcProxy), vec![]);
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("connection").unwrap(), "close");
    }

    #[tokio::test]
    async fn rest_mapped_class_is_not_implemented_by_the_fallback() {
        let app = router(state_with("orchestrator", ProtocolClass::RestMapped), vec![]);
        let req = Request::builder().uri("/orchestrator/jobs").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn nested_router_wins_over_the_fallback_dispatcher() {
        let nested = vec![("/health", crate::health::router())];
        let app = router(state_with("metadata", ProtocolClass::GrpcProxy), nested);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
    }
}
