//! Append-only JSON-lines event log: security events, ban events, access
//! records. Mirrors the original's `Logger` — one JSON object per line,
//! write failures logged and swallowed, never propagated to the request path.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::lock_utils::lock_or_recover;

pub struct EventSink {
    log_path: PathBuf,
    file: Mutex<()>,
}

#[derive(Debug, Serialize)]
struct SecurityEventRecord<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    event_type: &'a str,
    client_ip: &'a str,
    details: &'a str,
}

#[derive(Debug, Serialize)]
struct BanEventRecord<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    client_ip: &'a str,
    reason: &'a str,
}

#[derive(Debug, Serialize)]
struct AccessRecord<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    client_ip: &'a str,
    method: &'a str,
    path: &'a str,
    status: u16,
}

impl EventSink {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            file: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) {
        let _guard = lock_or_recover(&self.file, "event log file");
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!("failed to write to event log: {}", e);
        }
    }

    pub fn log_security_event(&self, event_type: &str, ip: &str, details: &str) {
        let record = SecurityEventRecord {
            timestamp: Local::now().to_rfc3339(),
            kind: "security_event",
            event_type,
            client_ip: ip,
            details,
        };
        info!(event_type, ip, details, "security event");
        if let Ok(line) = serde_json::to_string(&record) {
            self.append(&line);
        }
    }

    pub fn log_ban_event(&self, ip: &str, reason: &str) {
        let record = BanEventRecord {
            timestamp: Local::now().to_rfc3339(),
            kind: "ban_event",
            client_ip: ip,
            reason,
        };
        info!(ip, reason, "ip banned");
        if let Ok(line) = serde_json::to_string(&record) {
            self.append(&line);
        }
    }

    pub fn log_access(&self, ip: &str, method: &str, path: &str, status: u16) {
        let record = AccessRecord {
            timestamp: Local::now().to_rfc3339(),
            kind: "access_log",
            client_ip: ip,
            method,
            path,
            status,
        };
        info!(ip, method, path, status, "access");
        if let Ok(line) = serde_json::to_string(&record) {
            self.append(&line);
        }
    }

    /// Returns the last `limit` lines of the log file, parsed as JSON and
    /// mapped into the admin-surface shape (`security_event` ->
    /// `{timestamp,ip,eventType,details}`, `ban_event` ->
    /// `{...,eventType:"IP_BANNED",details:reason}`). The raw tail window is
    /// taken first (`limit` lines), matching the original's
    /// `f.readlines()[-limit:]`, and access records and unparseable lines
    /// are then dropped from that already-bounded window — so interleaved
    /// access-log traffic can reduce the number of events returned, rather
    /// than the scan reaching further back in the file to fill the quota.
    /// Any read failure yields an empty list.
    pub fn recent_admin_logs(&self, limit: usize) -> Vec<Value> {
        let lines = match read_lines(&self.log_path) {
            Some(lines) => lines,
            None => return Vec::new(),
        };

        let tail_start = lines.len().saturating_sub(limit);
        lines[tail_start..]
            .iter()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|entry| map_to_admin_view(&entry))
            .collect()
    }
}

fn read_lines(path: &Path) -> Option<Vec<String>> {
    let contents = std::fs::read_to_string(path).ok()?;
    Some(contents.lines().map(|l| l.to_string()).collect())
}

fn map_to_admin_view(entry: &Value) -> Option<Value> {
    match entry.get("type").and_then(Value::as_str) {
        Some("security_event") => Some(serde_json::json!({
            "timestamp": entry.get("timestamp"),
            "ip": entry.get("client_ip"),
            "eventType": entry.get("event_type"),
            "details": entry.get("details").cloned().unwrap_or(Value::String(String::new())),
        })),
        Some("ban_event") => Some(serde_json::json!({
            "timestamp": entry.get("timestamp"),
            "ip": entry.get("client_ip"),
            "eventType": "IP_BANNED",
            "details": entry.get("reason").cloned().unwrap_or(Value::String(String::new())),
        })),
        _ => None,
    }
}
