use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::lock_utils::{read_lock_or_recover, write_lock_or_recover};

/// Fields the admin surface can read and mutate at runtime (`/admin/config`).
///
/// Readers must tolerate a torn read of an individual scalar field — each
/// field is replaced as a whole by the write lock, never partially updated,
/// so this is really "tolerate reading a slightly stale whole snapshot",
/// which a single `RwLock` clone gives us for free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutableConfig {
    #[serde(rename = "maxRequests")]
    pub max_requests: u32,
    #[serde(rename = "timeWindow")]
    pub time_window_seconds: u64,
    /// Carried for admin-surface compatibility; not consulted by the gate
    /// or the IP state store (bans have no TTL — manual unban only).
    #[serde(rename = "banDuration")]
    pub ban_duration: u64,
    #[serde(rename = "backendUrl")]
    pub backend_url: String,
}

impl Default for MutableConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            time_window_seconds: 60,
            ban_duration: 10,
            backend_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Process-wide configuration.
///
/// `waf_port`, the persistence paths, and the violation thresholds are
/// fixed at startup. The four fields the admin surface exposes live in
/// `mutable`, read-locked once per request into an owned snapshot so the
/// gate never observes a config change mid-decision.
#[derive(Debug)]
pub struct Config {
    pub waf_port: u16,
    pub banned_ips_path: PathBuf,
    pub log_path: PathBuf,
    pub config_path: PathBuf,
    pub max_violations: u32,
    pub violation_window_seconds: u64,
    mutable: RwLock<MutableConfig>,
}

/// On-disk representation of the startup (non-admin-mutable) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StaticConfigFile {
    waf_port: u16,
    banned_ips_path: String,
    log_path: String,
    config_path: String,
    max_violations: u32,
    violation_window_seconds: u64,
    max_requests: u32,
    time_window_seconds: u64,
    ban_duration: u64,
    backend_url: String,
}

impl Default for StaticConfigFile {
    fn default() -> Self {
        let mutable = MutableConfig::default();
        Self {
            waf_port: 8080,
            banned_ips_path: "banned_ips.json".to_string(),
            log_path: "waf_access.log".to_string(),
            config_path: "waf_config.json".to_string(),
            max_violations: 3,
            violation_window_seconds: 300,
            max_requests: mutable.max_requests,
            time_window_seconds: mutable.time_window_seconds,
            ban_duration: mutable.ban_duration,
            backend_url: mutable.backend_url,
        }
    }
}

impl Config {
    fn from_parts(file: StaticConfigFile) -> anyhow::Result<Self> {
        let config = Self {
            waf_port: file.waf_port,
            banned_ips_path: PathBuf::from(file.banned_ips_path),
            log_path: PathBuf::from(file.log_path),
            config_path: PathBuf::from(file.config_path),
            max_violations: file.max_violations,
            violation_window_seconds: file.violation_window_seconds,
            mutable: RwLock::new(MutableConfig {
                max_requests: file.max_requests,
                time_window_seconds: file.time_window_seconds,
                ban_duration: file.ban_duration,
                backend_url: file.backend_url,
            }),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load startup config from a TOML file; fall back to defaults if the
    /// file is absent (a missing startup file is not an error — only a
    /// malformed one is). A persisted admin overlay (`config_path`) then
    /// takes precedence over the startup file for the four admin-mutable
    /// fields, matching the original's "waf_config.json if present, else
    /// live defaults" behavior.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = if path.exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            StaticConfigFile::default()
        };
        let config = Self::from_parts(file)?;
        if let Ok(overlay) = config.load_mutable_overlay() {
            *write_lock_or_recover(&config.mutable, "config overlay") = overlay;
        }
        Ok(config)
    }

    fn load_mutable_overlay(&self) -> anyhow::Result<MutableConfig> {
        let contents = fs::read_to_string(&self.config_path)?;
        let overlay: MutableConfig = serde_json::from_str(&contents)?;
        Ok(overlay)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mutable = read_lock_or_recover(&self.mutable, "config validation");
        if mutable.max_requests < 1 {
            anyhow::bail!("max_requests must be >= 1");
        }
        if mutable.time_window_seconds < 1 {
            anyhow::bail!("time_window_seconds must be >= 1");
        }
        if self.max_violations < 1 {
            anyhow::bail!("max_violations must be >= 1");
        }
        Ok(())
    }

    /// Take an owned snapshot of the admin-mutable fields for one request.
    pub fn snapshot(&self) -> MutableConfig {
        read_lock_or_recover(&self.mutable, "config snapshot").clone()
    }

    /// Apply an admin update, persisting the new overlay to `config_path`.
    pub fn update_mutable(&self, update: MutableConfig) -> anyhow::Result<()> {
        let serialized = serde_json::to_string_pretty(&update)?;
        fs::write(&self.config_path, serialized)?;
        *write_lock_or_recover(&self.mutable, "config update") = update;
        Ok(())
    }

    /// Render the admin-surface `/admin/config` GET response: the persisted
    /// file if present, otherwise the live in-memory defaults.
    pub fn admin_config_view(&self) -> serde_json::Value {
        match fs::read_to_string(&self.config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(value) => value,
                Err(_) => serde_json::to_value(self.snapshot()).unwrap_or_default(),
            },
            Err(_) => serde_json::to_value(self.snapshot()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::from_parts(StaticConfigFile::default()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.snapshot().max_requests, 100);
        assert_eq!(config.max_violations, 3);
    }

    #[test]
    fn rejects_zero_max_requests() {
        let mut file = StaticConfigFile::default();
        file.max_requests = 0;
        assert!(Config::from_parts(file).is_err());
    }

    #[test]
    fn rejects_zero_time_window() {
        let mut file = StaticConfigFile::default();
        file.time_window_seconds = 0;
        assert!(Config::from_parts(file).is_err());
    }

    #[test]
    fn rejects_zero_max_violations() {
        let mut file = StaticConfigFile::default();
        file.max_violations = 0;
        assert!(Config::from_parts(file).is_err());
    }

    #[test]
    fn mutable_config_round_trips_through_json() {
        let original = MutableConfig::default();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: MutableConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(original.max_requests, parsed.max_requests);
        assert_eq!(original.backend_url, parsed.backend_url);
    }

    #[test]
    fn update_mutable_persists_and_is_visible_in_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("waf_config.json");
        let mut file = StaticConfigFile::default();
        file.config_path = config_path.to_string_lossy().to_string();
        let config = Config::from_parts(file).unwrap();

        let update = MutableConfig {
            max_requests: 5,
            time_window_seconds: 10,
            ban_duration: 60,
            backend_url: "http://upstream:8000".to_string(),
        };
        config.update_mutable(update.clone()).unwrap();

        assert_eq!(config.snapshot().max_requests, 5);
        assert!(config_path.exists());

        let view = config.admin_config_view();
        assert_eq!(view["maxRequests"], 5);
        assert_eq!(view["backendUrl"], "http://upstream:8000");
    }

    #[test]
    fn admin_config_view_falls_back_to_defaults_without_persisted_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = StaticConfigFile::default();
        file.config_path = dir.path().join("missing.json").to_string_lossy().to_string();
        let config = Config::from_parts(file).unwrap();

        let view = config.admin_config_view();
        assert_eq!(view["maxRequests"], 100);
    }
}
