//! HTTP server harness: binds `waf_port`, extracts the real TCP peer address
//! from the connection (never a spoofable `X-Forwarded-For`), dispatches
//! into the gate, and answers `OPTIONS` preflights directly.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};
use tracing::{error, info};

use crate::gate::{self, options_response, AppState};

/// Binds `0.0.0.0:{state.config.waf_port}` and serves every connection until
/// a Ctrl-C/SIGINT is observed, then drains in-flight requests and returns so
/// the caller can flush the banned set before exit.
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.waf_port));

    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let state = state.clone();
        let remote_addr = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                dispatch(state.clone(), req, remote_addr)
            }))
        }
    });

    info!("WAF listening on http://{}", addr);

    let server = Server::bind(&addr).serve(make_svc);
    let graceful = server.with_graceful_shutdown(shutdown_signal());

    if let Err(e) = graceful.await {
        error!("server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install Ctrl-C handler: {}", e);
        return;
    }
    info!("shutdown signal received, draining in-flight requests");
}

/// Routes every method the WAF accepts into the gate; answers `OPTIONS`
/// preflights without touching the gate at all (no ban/rate-limit state is
/// consulted for a preflight, matching the original's bare early return).
async fn dispatch(
    state: Arc<AppState>,
    req: Request<Body>,
    remote_addr: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::OPTIONS {
        return Ok(options_response());
    }

    match *req.method() {
        Method::GET
        | Method::POST
        | Method::PUT
        | Method::DELETE
        | Method::PATCH => Ok(gate::handle(state, req, remote_addr.ip()).await),
        _ => Ok(gate::error_response(
            hyper::StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed",
        )),
    }
}
