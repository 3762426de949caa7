//! Forwards a request that passed the gate to the backend origin, relaying
//! its response verbatim plus the hardening/CORS header set.

use std::time::Duration;

use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Response, StatusCode};
use tracing::error;

use crate::gate::{apply_cors_headers, apply_hardening_headers, error_response};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the upstream request from the already-validated inbound parts and
/// body, forwards it with a 10s timeout, and returns the relayed response
/// plus, on failure, the error string a `FORWARD_ERROR` security event should
/// carry. A `502` is returned either way; forwarding is never retried.
pub async fn forward(
    client: &Client<HttpConnector>,
    backend_url: &str,
    mut parts: hyper::http::request::Parts,
    body: Bytes,
) -> (Response<Body>, Option<String>) {
    let target = format!("{}{}", backend_url.trim_end_matches('/'), parts.uri);
    let uri: hyper::Uri = match target.parse() {
        Ok(u) => u,
        Err(e) => {
            let msg = format!("invalid upstream uri {:?}: {}", target, e);
            error!("{}", msg);
            return (
                error_response(StatusCode::BAD_GATEWAY, "Error forwarding request"),
                Some(msg),
            );
        }
    };
    parts.uri = uri;
    parts.headers.remove(hyper::header::CONNECTION);

    let upstream_req = Request::from_parts(parts, Body::from(body));

    let result = tokio::time::timeout(UPSTREAM_TIMEOUT, client.request(upstream_req)).await;

    match result {
        Ok(Ok(upstream_resp)) => (relay(upstream_resp), None),
        Ok(Err(e)) => {
            let msg = format!("upstream request failed: {}", e);
            error!("{}", msg);
            (
                error_response(StatusCode::BAD_GATEWAY, "Error forwarding request"),
                Some(msg),
            )
        }
        Err(_) => {
            let msg = format!("upstream request timed out after {:?}", UPSTREAM_TIMEOUT);
            error!("{}", msg);
            (
                error_response(StatusCode::BAD_GATEWAY, "Error forwarding request"),
                Some(msg),
            )
        }
    }
}

fn relay(upstream_resp: Response<Body>) -> Response<Body> {
    let (parts, body) = upstream_resp.into_parts();
    let mut builder = Response::builder().status(parts.status);
    for (name, value) in parts.headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "transfer-encoding" || lower == "connection" {
            continue;
        }
        builder = builder.header(name, value);
    }

    let mut resp = builder.body(body).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .body(Body::empty())
            .expect("fallback response is well-formed")
    });

    apply_hardening_headers(&mut resp);
    apply_cors_headers(&mut resp);
    resp
}
