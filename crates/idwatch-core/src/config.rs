//! monitor.toml configuration parser.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ServiceDescriptor, ServiceRegistry, normalize_service_name};

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("service entry #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("service names {first:?} and {second:?} both map to storage key {key:?}")]
    NameCollision {
        first: String,
        second: String,
        key: String,
    },

    #[error("service {service}: `{field}` is not an http:// URL: {value:?}")]
    InvalidUrl {
        service: String,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub backup: BackupSection,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Address the status API binds to.
    pub listen: SocketAddr,
    /// Delay between poll cycles (e.g., "3s").
    pub interval: String,
    /// Timeout for each ping request.
    pub probe_timeout: String,
    /// Timeout for the secondary metrics request.
    pub metrics_timeout: String,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8006)),
            interval: "3s".to_string(),
            probe_timeout: "2s".to_string(),
            metrics_timeout: "1s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSection {
    /// Directory holding one snapshot folder per service.
    pub root: PathBuf,
    /// Storage engine label reported for every database.
    pub engine: String,
    /// Keep at most this many snapshots per service; unset keeps all.
    pub max_snapshots: Option<usize>,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("backups"),
            engine: "SQLite3".to_string(),
            max_snapshots: None,
        }
    }
}

impl MonitorConfig {
    /// Load, validate, and resolve relative paths against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate without touching the filesystem.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration("monitor.interval", &self.monitor.interval)?;
        check_duration("monitor.probe_timeout", &self.monitor.probe_timeout)?;
        check_duration("monitor.metrics_timeout", &self.monitor.metrics_timeout)?;

        let mut seen = HashSet::new();
        let mut keys: HashMap<String, &str> = HashMap::new();
        for (index, svc) in self.services.iter().enumerate() {
            if svc.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(svc.name.as_str()) {
                return Err(ConfigError::DuplicateService(svc.name.clone()));
            }
            let key = normalize_service_name(&svc.name);
            if let Some(first) = keys.get(&key) {
                return Err(ConfigError::NameCollision {
                    first: first.to_string(),
                    second: svc.name.clone(),
                    key,
                });
            }
            keys.insert(key, svc.name.as_str());
            check_url(&svc.name, "ping_url", &svc.ping_url)?;
            // An empty metrics_url means the service exposes no metrics endpoint.
            if !svc.metrics_url.is_empty() {
                check_url(&svc.name, "metrics_url", &svc.metrics_url)?;
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.backup.root.is_relative() {
            self.backup.root = base.join(&self.backup.root);
        }
        for svc in &mut self.services {
            if let Some(db) = svc.database.as_mut() {
                if db.is_relative() {
                    *db = base.join(&*db);
                }
            }
        }
    }

    pub fn interval(&self) -> Duration {
        parse_duration(&self.monitor.interval).unwrap_or(Duration::from_secs(3))
    }

    pub fn probe_timeout(&self) -> Duration {
        parse_duration(&self.monitor.probe_timeout).unwrap_or(Duration::from_secs(2))
    }

    pub fn metrics_timeout(&self) -> Duration {
        parse_duration(&self.monitor.metrics_timeout).unwrap_or(Duration::from_secs(1))
    }

    pub fn registry(&self) -> ServiceRegistry {
        ServiceRegistry::new(self.services.clone())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn check_duration(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(()),
        _ => Err(ConfigError::Duration {
            field,
            value: value.to_string(),
        }),
    }
}

fn check_url(service: &str, field: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = value
        .parse::<http::Uri>()
        .map(|uri| uri.scheme_str() == Some("http") && uri.authority().is_some())
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            service: service.to_string(),
            field,
            value: value.to_string(),
        })
    }
}

/// Parse a duration string like "3s", "500ms", "1m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.trim().parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
