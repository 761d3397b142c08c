//! Protocol Negotiator (spec.md §4.8). Per new TCP connection: attach a
//! connection id and idle-timeout, then hand the connection to an
//! HTTP/1-or-HTTP/2 codec that auto-detects the `Upgrade: h2c` request
//! or the HTTP/2 prior-knowledge preface (`PRI * HTTP/2.0`) and switches
//! accordingly. `hyper_util::server::conn::auto::Builder` is exactly
//! this negotiation, already in the pack's own dependency stack
//! (DataDog-libdatadog's `ddtelemetry`/`ddcommon` pull in `hyper`/
//! `hyper-util` the same way); this crate just supplies the idle-timeout
//! and connection-id pieces `dog_axum::app`'s `ensure_request_id`
//! middleware modeled for a single request, generalized here to the
//! whole connection's lifetime.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tower::Service;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct NegotiatorConfig {
    pub idle_timeout: Duration,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self { idle_timeout: Duration::from_secs(60) }
    }
}

impl NegotiatorConfig {
    /// Clamps a requested idle timeout into spec.md §4.8's bounds
    /// (default 60s, max 3600s).
    pub fn with_idle_timeout(requested: Duration) -> Self {
        Self { idle_timeout: requested.min(Duration::from_secs(3600)) }
    }
}

/// Monotonic per-process connection id counter (spec.md §5: "a
/// per-process connection-id counter" is the one piece of shared mutable
/// state besides the pools).
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Accepts connections on `listener`, negotiating HTTP/1 vs HTTP/2 per
/// connection and dispatching every request into `make_router`'s Axum
/// router. Runs until the process is told to stop — callers `tokio::
/// select!` this future against a shutdown signal.
pub async fn serve<F>(listener: TcpListener, config: NegotiatorConfig, make_router: F)
where
    F: Fn() -> axum::Router<()> + Send + Sync + 'static,
{
    let make_router = Arc::new(make_router);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let router = (make_router)();
        let idle_timeout = config.idle_timeout;

        tokio::spawn(async move {
            info!(connection_id, %peer, "accepted connection");
            if let Err(e) = serve_connection(stream, router, idle_timeout).await {
                warn!(connection_id, error = %e, "connection ended with error");
            }
        });
    }
}

async fn serve_connection(stream: TcpStream, router: axum::Router<()>, idle_timeout: Duration) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);
    let service = hyper::service::service_fn(move |req: Request<hyper::body::Incoming>| {
        let mut router = router.clone();
        async move {
            let req = req.map(Body::new);
            let resp = Service::call(&mut router, req).await.unwrap_or_else(|err: Infallible| match err {});
            Ok::<_, Infallible>(resp)
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(io, service);

    tokio::select! {
        result = conn => result.map_err(|e| anyhow::anyhow!("connection error: {e}")),
        _ = tokio::time::sleep(idle_timeout) => {
            // Idle past the configured timeout: the connection is
            // dropped, which cancels any in-flight proxied request
            // (spec.md §4.8).
            Err(anyhow::anyhow!("connection idle timeout"))
        }
    }
}
