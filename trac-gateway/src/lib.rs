//! TRAC Gateway (spec.md §4.8-4.10): the single network-facing process.
//! Negotiates HTTP/1 vs HTTP/2 per connection, routes by first path
//! segment to one of five protocol classes, and proxies accordingly —
//! transparent HTTP/1, raw gRPC, gRPC-Web translation, or a declarative
//! REST<->gRPC bridge. `INTERNAL` routes (health) are plain Axum
//! sub-routers nested alongside the rest.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod grpc_web;
pub mod health;
pub mod negotiator;
pub mod proxy_grpc;
pub mod proxy_http;
pub mod rest_gateway;
pub mod router;

pub use config::{GatewayConfig, GatewayTimeouts};
pub use dispatch::{router as build_router, GatewayState};
pub use error::GatewayError;
pub use negotiator::{serve, NegotiatorConfig};
pub use proxy_grpc::GrpcProxy;
pub use proxy_http::HttpProxy;
pub use rest_gateway::{GrpcInvoker, RestGateway, RestMapping};
pub use router::{ProtocolClass, Route, RouteTable, RouteTarget};
