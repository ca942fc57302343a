//! Monitored target descriptors and the registry that orders them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A backend service the monitor probes. Identity is `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Liveness endpoint; must answer 200 for the service to count as online.
    pub ping_url: String,
    /// Optional self-reported metrics endpoint (opaque JSON object).
    #[serde(default)]
    pub metrics_url: String,
    /// On-disk database file backing this service, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, ping_url: &str, metrics_url: &str) -> Self {
        Self {
            name: name.to_string(),
            ping_url: ping_url.to_string(),
            metrics_url: metrics_url.to_string(),
            database: None,
        }
    }

    /// Attach an on-disk database path.
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    /// Port the ping endpoint listens on, falling back to the scheme default.
    pub fn port(&self) -> Option<u16> {
        let uri: http::Uri = self.ping_url.parse().ok()?;
        uri.port_u16().or_else(|| match uri.scheme_str() {
            Some("https") => Some(443),
            Some("http") => Some(80),
            _ => None,
        })
    }

    /// Database path, if configured.
    pub fn database_path(&self) -> Option<&Path> {
        self.database.as_deref()
    }
}

/// Storage key for a service name: lowercase, anything outside
/// `[a-z0-9_-]` becomes `_`. Names sharing a key share a snapshot directory.
pub fn normalize_service_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Immutable, ordered list of monitored services.
///
/// Cloning is cheap; the poller and the API share one registry.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<[ServiceDescriptor]>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services: services.into(),
        }
    }

    /// Descriptors in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
