//! Admin JSON API: `/admin/stats`, `/admin/logs`, `/admin/ban|unban/<ip>`,
//! `/admin/config`. Handled as a short-circuit before the ban/rate-limit/
//! signature pipeline runs (an admin caller is not itself subject to the WAF).

use std::sync::Arc;

use hyper::{Body, Method, Request, Response, StatusCode};

use crate::config::MutableConfig;
use crate::gate::{error_response, json_response, AppState};

const RECENT_LOGS_LIMIT: usize = 50;

pub async fn handle(
    state: &Arc<AppState>,
    method: &Method,
    path: &str,
    req: Request<Body>,
) -> Response<Body> {
    match path {
        "/admin/stats" => return stats(state),
        "/admin/logs" => return logs(state),
        "/admin/config" if *method == Method::GET => return config_get(state),
        "/admin/config" if *method == Method::POST => return config_post(state, req).await,
        _ => {}
    }

    if let Some(ip) = path.strip_prefix("/admin/unban/") {
        return unban(state, ip);
    }
    if let Some(ip) = path.strip_prefix("/admin/ban/") {
        return ban(state, ip);
    }

    error_response(StatusCode::NOT_FOUND, "unknown admin endpoint")
}

fn stats(state: &Arc<AppState>) -> Response<Body> {
    let mutable = state.config.snapshot();
    let banned = state.store.banned_ips();
    json_response(&serde_json::json!({
        "rate_limit": {
            "max": mutable.max_requests,
            "window": mutable.time_window_seconds,
        },
        "bannedIPs": banned,
        "totalBannedIPs": banned.len(),
    }))
}

fn logs(state: &Arc<AppState>) -> Response<Body> {
    let entries = state.events.recent_admin_logs(RECENT_LOGS_LIMIT);
    json_response(&serde_json::Value::Array(entries))
}

fn unban(state: &Arc<AppState>, ip: &str) -> Response<Body> {
    state.store.unban(ip);
    json_response(&serde_json::json!({"status": "unbanned", "ip": ip}))
}

fn ban(state: &Arc<AppState>, ip: &str) -> Response<Body> {
    state.store.ban(ip);
    json_response(&serde_json::json!({"status": "banned", "ip": ip}))
}

fn config_get(state: &Arc<AppState>) -> Response<Body> {
    json_response(&state.config.admin_config_view())
}

async fn config_post(state: &Arc<AppState>, req: Request<Body>) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid config: {}", e)),
    };

    let update: MutableConfig = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid config: {}", e)),
    };

    match state.config.update_mutable(update.clone()) {
        Ok(()) => json_response(&serde_json::json!({
            "status": "success",
            "config": update,
        })),
        Err(e) => error_response(StatusCode::BAD_REQUEST, format!("Invalid config: {}", e)),
    }
}
