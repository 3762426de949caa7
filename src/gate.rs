//! Request gate: the ordered admin / ban / rate-limit / signature pipeline
//! every inbound request passes through before being forwarded upstream.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::{Body, Request, Response, StatusCode};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{ErrorBody, WafError};
use crate::events::EventSink;
use crate::state::IpStateStore;
use crate::{admin, detector, private_target, proxy};

/// How often the sweeper re-checks the sliding windows, independent of the
/// configured request/violation windows themselves, so a later admin config
/// change is picked up without restarting the sweeper task.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 10 MiB: requests whose declared `Content-Length` exceeds this are
/// rejected with 413 before the body is read.
pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

const CORS_ORIGIN: &str = "http://localhost:5173";

pub struct AppState {
    pub config: Config,
    pub store: IpStateStore,
    pub events: EventSink,
    pub http_client: hyper::Client<hyper::client::HttpConnector>,
}

impl AppState {
    pub fn new(config: Config, store: IpStateStore, events: EventSink) -> Self {
        Self {
            config,
            store,
            events,
            http_client: hyper::Client::new(),
        }
    }

    /// Spawns the background sweeper that drops dead request-log/violation-log
    /// keys nobody has touched recently (see `IpStateStore::sweep`). Runs for
    /// the lifetime of the process; there is no handle to cancel it, matching
    /// the rest of the crate's "shutdown just stops accepting and flushes the
    /// banned set" posture.
    pub fn spawn_state_sweeper(self: &Arc<Self>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                let mutable = state.config.snapshot();
                state
                    .store
                    .sweep(mutable.time_window_seconds, state.config.violation_window_seconds);
            }
        });
    }
}

/// Applies the CORS header set every WAF response carries, admin or proxied.
pub fn apply_cors_headers(resp: &mut Response<Body>) {
    let headers = resp.headers_mut();
    headers.insert("Access-Control-Allow-Origin", CORS_ORIGIN.parse().unwrap());
    headers.insert(
        "Access-Control-Allow-Methods",
        "GET, POST, PUT, DELETE, PATCH, OPTIONS".parse().unwrap(),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        "Content-Type, Authorization, X-Requested-With".parse().unwrap(),
    );
    headers.insert("Access-Control-Allow-Credentials", "true".parse().unwrap());
    headers.insert("Access-Control-Max-Age", "86400".parse().unwrap());
}

/// Applies the baseline hardening headers every WAF response carries.
pub fn apply_hardening_headers(resp: &mut Response<Body>) {
    let headers = resp.headers_mut();
    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("Referrer-Policy", "no-referrer".parse().unwrap());
    headers.insert(
        "Permissions-Policy",
        "geolocation=(), microphone=()".parse().unwrap(),
    );
    headers.insert(
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains".parse().unwrap(),
    );
}

/// Builds a `{"error": "...", "status": n}` JSON response with the full
/// CORS + hardening header set, matching the external error contract.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let body = ErrorBody::new(message, status);
    let json = serde_json::to_vec(&body).unwrap_or_default();
    let mut resp = Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(json))
        .expect("error response is well-formed");
    apply_cors_headers(&mut resp);
    apply_hardening_headers(&mut resp);
    resp
}

/// Same as `error_response`, but sourced from a typed `WafError` so the
/// status code and message stay derived from one place.
fn error_response_for(err: WafError) -> Response<Body> {
    let body = ErrorBody::from(&err);
    error_response(err.status(), body.error)
}

/// Builds a `200 OK` JSON response with the full CORS + hardening header
/// set, matching every other WAF response (spec.md §4.F: "All admin
/// endpoints respond in JSON with CORS + hardening headers").
pub fn json_response(value: &serde_json::Value) -> Response<Body> {
    let json = serde_json::to_vec(value).unwrap_or_default();
    let mut resp = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(json))
        .expect("json response is well-formed");
    apply_cors_headers(&mut resp);
    apply_hardening_headers(&mut resp);
    resp
}

pub fn options_response() -> Response<Body> {
    let mut resp = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Content-Length", "0")
        .body(Body::empty())
        .expect("options response is well-formed");
    apply_cors_headers(&mut resp);
    resp
}

/// Entry point for every non-`OPTIONS` request. `path_and_query` is the raw
/// (not percent-decoded) request target, matching the original's use of
/// `self.path`.
pub async fn handle(
    state: Arc<AppState>,
    req: Request<Body>,
    peer_ip: IpAddr,
) -> Response<Body> {
    let method = req.method().clone();
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let client_ip = peer_ip.to_string();

    if path_and_query.starts_with("/admin") {
        return admin::handle(&state, &method, &path_and_query, req).await;
    }

    if state.store.is_banned(&client_ip) {
        state.events.log_access(&client_ip, method.as_str(), &path_and_query, 403);
        return error_response(StatusCode::FORBIDDEN, "Your IP is banned");
    }

    let mutable = state.config.snapshot();
    if state
        .store
        .check_and_record_request(&client_ip, mutable.max_requests, mutable.time_window_seconds)
    {
        state.events.log_security_event(
            "RATE_LIMIT",
            &client_ip,
            &format!(
                "Exceeded {} requests in {}s",
                mutable.max_requests, mutable.time_window_seconds
            ),
        );
        state.events.log_access(&client_ip, method.as_str(), &path_and_query, 429);
        return error_response(StatusCode::TOO_MANY_REQUESTS, "Too many requests");
    }

    if req.headers().get(hyper::header::TRANSFER_ENCODING).is_some()
        && req.headers().get(hyper::header::CONTENT_LENGTH).is_none()
    {
        return error_response_for(WafError::ChunkedNotSupported);
    }

    let content_length = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    if content_length > MAX_BODY_BYTES {
        return error_response_for(WafError::BodyTooLarge(MAX_BODY_BYTES as usize));
    }

    let (parts, body) = req.into_parts();
    let body_bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to read request body: {}", e);
            return error_response_for(WafError::BodyReadFailed(e.to_string()));
        }
    };

    let decoded_path = urlencoding::decode(&path_and_query)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path_and_query.clone());
    let body_text = String::from_utf8_lossy(&body_bytes);
    let combined = format!("{} {}", decoded_path, body_text);

    if detector::is_xss(&combined) {
        return reject(&state, &client_ip, &method, &path_and_query, "XSS", &combined, true, "XSS attack detected").await;
    }

    if detector::is_path_traversal(&decoded_path) {
        return reject(
            &state,
            &client_ip,
            &method,
            &path_and_query,
            "PATH_TRAVERSAL",
            &decoded_path,
            false,
            "Path traversal detected",
        )
        .await;
    }

    if detector::is_sql_injection(&combined) {
        return reject(
            &state,
            &client_ip,
            &method,
            &path_and_query,
            "SQL_INJECTION",
            &combined,
            true,
            "SQL injection detected",
        )
        .await;
    }

    if is_ssrf(&combined).await {
        return reject(&state, &client_ip, &method, &path_and_query, "SSRF", &combined, true, "SSRF attack detected").await;
    }

    let (response, forward_error) = proxy::forward(
        &state.http_client,
        &mutable.backend_url,
        parts,
        body_bytes,
    )
    .await;

    if let Some(err) = forward_error {
        state.events.log_security_event("FORWARD_ERROR", &client_ip, &err);
    }

    let status = response.status().as_u16();
    state.events.log_access(&client_ip, method.as_str(), &path_and_query, status);
    info!(%client_ip, %method, path = %path_and_query, status, "forwarded");
    response
}

async fn is_ssrf(combined: &str) -> bool {
    for candidate in detector::ssrf_candidates(combined) {
        if private_target::is_private_target(&candidate).await {
            return true;
        }
    }
    false
}

/// Logs the security + (possible) ban event, records the violation, logs
/// the 403 access record, and returns the block response. `detail_source`
/// is truncated to 100 chars when `truncate` is set, matching
/// `combined[:100]` in the original for XSS/SQLi/SSRF; path traversal
/// passes the full decoded path through untouched, matching the original's
/// `log_security_event("PATH_TRAVERSAL", client_ip, decoded_path)`.
async fn reject(
    state: &Arc<AppState>,
    client_ip: &str,
    method: &hyper::Method,
    path: &str,
    event_type: &str,
    detail_source: &str,
    truncate: bool,
    message: &str,
) -> Response<Body> {
    let detail: String = if truncate {
        detail_source.chars().take(100).collect()
    } else {
        detail_source.to_string()
    };
    state.events.log_security_event(event_type, client_ip, &detail);

    let auto_banned = state.store.record_violation(
        client_ip,
        state.config.max_violations,
        state.config.violation_window_seconds,
    );
    if auto_banned {
        state.events.log_ban_event(
            client_ip,
            &format!(
                "Automatic ban after {} security violations",
                state.config.max_violations
            ),
        );
    }

    state.events.log_access(client_ip, method.as_str(), path, 403);
    error_response(StatusCode::FORBIDDEN, message)
}
