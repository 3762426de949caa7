//! Per-IP state: banned set, sliding-window request log, violation log.
//!
//! Each collection is guarded by its own `Mutex` and locked independently —
//! never nested — so a rate-limit check can never block on, or deadlock
//! with, a ban lookup.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::lock_utils::lock_or_recover;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct IpStateStore {
    banned_ips_path: PathBuf,
    banned: Mutex<HashSet<String>>,
    request_log: Mutex<HashMap<String, Vec<f64>>>,
    violations: Mutex<HashMap<String, Vec<f64>>>,
}

impl IpStateStore {
    /// Loads the banned set from disk if present. A missing or corrupt file
    /// is treated as "no bans yet", matching the original's bare
    /// `except: self.banned_ips.clear()`.
    pub fn load(banned_ips_path: impl Into<PathBuf>) -> Self {
        let banned_ips_path = banned_ips_path.into();
        let banned = Self::read_banned_file(&banned_ips_path).unwrap_or_default();
        Self {
            banned_ips_path,
            banned: Mutex::new(banned),
            request_log: Mutex::new(HashMap::new()),
            violations: Mutex::new(HashMap::new()),
        }
    }

    fn read_banned_file(path: &Path) -> Option<HashSet<String>> {
        let contents = fs::read_to_string(path).ok()?;
        let ips: Vec<String> = serde_json::from_str(&contents).ok()?;
        Some(ips.into_iter().collect())
    }

    fn save(&self) {
        let banned = lock_or_recover(&self.banned, "banned ip set");
        let ips: Vec<&String> = banned.iter().collect();
        match serde_json::to_string(&ips) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.banned_ips_path, json) {
                    warn!("failed to persist banned ip set: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize banned ip set: {}", e),
        }
    }

    /// Flushes the banned set to disk; used for the orderly-shutdown path in
    /// addition to the write-through that already happens on every mutation.
    pub fn save_on_shutdown(&self) {
        self.save();
    }

    pub fn is_banned(&self, ip: &str) -> bool {
        lock_or_recover(&self.banned, "banned ip set").contains(ip)
    }

    pub fn ban(&self, ip: &str) {
        {
            let mut banned = lock_or_recover(&self.banned, "banned ip set");
            banned.insert(ip.to_string());
        }
        self.save();
    }

    pub fn unban(&self, ip: &str) {
        {
            let mut banned = lock_or_recover(&self.banned, "banned ip set");
            banned.remove(ip);
        }
        self.save();
    }

    pub fn banned_ips(&self) -> Vec<String> {
        lock_or_recover(&self.banned, "banned ip set")
            .iter()
            .cloned()
            .collect()
    }

    /// Slides the request-timestamp window for `ip`, returning `true` if the
    /// request must be rejected as rate-limited (the request is *not*
    /// recorded when rejected, matching the original's early return before
    /// the append). Prunes to an empty list and evicts the key opportunistically.
    pub fn check_and_record_request(&self, ip: &str, max_requests: u32, window_seconds: u64) -> bool {
        let now = now_secs();
        let mut log = lock_or_recover(&self.request_log, "request log");
        let mut timestamps = log.remove(ip).unwrap_or_default();
        timestamps.retain(|ts| now - ts < window_seconds as f64);

        if timestamps.len() as u32 >= max_requests {
            log.insert(ip.to_string(), timestamps);
            return true;
        }

        timestamps.push(now);
        log.insert(ip.to_string(), timestamps);
        false
    }

    /// Records a security violation for `ip`, pruning the violation window
    /// and auto-banning (returning `true`) once `max_violations` is reached
    /// within `window_seconds`.
    pub fn record_violation(&self, ip: &str, max_violations: u32, window_seconds: u64) -> bool {
        let now = now_secs();
        let should_ban = {
            let mut violations = lock_or_recover(&self.violations, "violation log");
            let mut timestamps = violations.remove(ip).unwrap_or_default();
            timestamps.retain(|ts| now - ts < window_seconds as f64);
            timestamps.push(now);
            let should_ban = timestamps.len() as u32 >= max_violations;
            violations.insert(ip.to_string(), timestamps);
            should_ban
        };

        if should_ban {
            self.ban(ip);
        }
        should_ban
    }

    /// Periodic sweep: drops any request-log or violation-log entry whose
    /// timestamps have all aged out of their window, even if that IP never
    /// makes another request to trigger on-access pruning. Without this, an
    /// IP seen once and never again leaves a dead key in the map forever
    /// (spec's "per-IP state growth" note).
    pub fn sweep(&self, request_window_seconds: u64, violation_window_seconds: u64) {
        let now = now_secs();
        {
            let mut log = lock_or_recover(&self.request_log, "request log");
            log.retain(|_, timestamps| {
                timestamps.retain(|ts| now - ts < request_window_seconds as f64);
                !timestamps.is_empty()
            });
        }
        {
            let mut violations = lock_or_recover(&self.violations, "violation log");
            violations.retain(|_, timestamps| {
                timestamps.retain(|ts| now - ts < violation_window_seconds as f64);
                !timestamps.is_empty()
            });
        }
    }
}
