//! Domain types for the idwatch health store.
//!
//! One [`ServiceStatus`] per monitored service, rebuilt wholesale on every
//! poll cycle. All types serialize to the JSON shape served by the status API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label reported by [`SnapshotInfo::none_yet`].
pub const NO_BACKUPS_LABEL: &str = "No backups yet";

// ── Liveness ──────────────────────────────────────────────────────

/// Outcome of the most recent ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Ping answered 200.
    Online,
    /// Ping could not be delivered (refused, timed out, bad URL).
    Offline,
    /// Ping answered with a non-200 status.
    Error,
}

// ── Resources ─────────────────────────────────────────────────────

/// Where a [`HostResources`] reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
    /// Self-reported by the service in its ping body.
    Remote,
    /// Sampled on the monitor's own host.
    Local,
}

/// CPU/RAM/disk utilisation in percent, plus the host address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disk_percent: f64,
    pub ip: String,
    pub source: ResourceSource,
}

impl HostResources {
    /// Zeroed local reading with a loopback placeholder address.
    pub fn zeroed() -> Self {
        Self {
            cpu_percent: 0.0,
            ram_percent: 0.0,
            disk_percent: 0.0,
            ip: "127.0.0.1".to_string(),
            source: ResourceSource::Local,
        }
    }
}

// ── Database ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbStatus {
    Connected,
    Disconnected,
    Unknown,
}

impl DbStatus {
    /// Interpret a free-form `db_status` string reported by a service.
    pub fn from_reported(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "connected" | "ok" | "up" | "healthy" => Self::Connected,
            "disconnected" | "down" | "error" | "unhealthy" => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

/// Whether the service's database file is visible to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountStatus {
    /// File found at the configured path.
    Mounted,
    /// No local file, but the service reported a database status.
    Remote,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub status: DbStatus,
    /// Bytes on disk; 0 when the file is not mounted locally.
    pub size_on_disk: u64,
    pub engine: String,
    pub mount_status: MountStatus,
}

impl DatabaseInfo {
    /// Placeholder used before the on-disk store has been inspected.
    pub fn unknown(engine: &str) -> Self {
        Self {
            status: DbStatus::Unknown,
            size_on_disk: 0,
            engine: engine.to_string(),
            mount_status: MountStatus::NotFound,
        }
    }

    /// Combine the self-reported status with what is found on disk.
    ///
    /// A local file wins for size and mount status; the reported status wins
    /// over the liveness-derived one.
    pub fn resolve(
        engine: &str,
        reported: Option<DbStatus>,
        online: bool,
        size_on_disk: Option<u64>,
    ) -> Self {
        match (size_on_disk, reported) {
            (Some(size), reported) => Self {
                status: reported.unwrap_or(if online {
                    DbStatus::Connected
                } else {
                    DbStatus::Disconnected
                }),
                size_on_disk: size,
                engine: engine.to_string(),
                mount_status: MountStatus::Mounted,
            },
            (None, Some(status)) => Self {
                status,
                size_on_disk: 0,
                engine: engine.to_string(),
                mount_status: MountStatus::Remote,
            },
            (None, None) => Self::unknown(engine),
        }
    }
}

// ── Backups ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupState {
    /// No snapshot has been taken yet.
    Idle,
    Success,
    /// The snapshot directory could not be read.
    Error,
}

/// Summary of the most recent snapshot for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Human-readable creation time, or [`NO_BACKUPS_LABEL`].
    pub last_snapshot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Size in MiB, rounded to two decimals.
    pub size_mb: f64,
    pub status: BackupState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl SnapshotInfo {
    /// Sentinel for a service with no snapshots on disk.
    pub fn none_yet() -> Self {
        Self {
            last_snapshot: NO_BACKUPS_LABEL.to_string(),
            created_at: None,
            size_mb: 0.0,
            status: BackupState::Idle,
            filename: None,
        }
    }

    /// Sentinel for an unreadable snapshot directory.
    pub fn unavailable() -> Self {
        Self {
            status: BackupState::Error,
            ..Self::none_yet()
        }
    }
}

// ── Service status ────────────────────────────────────────────────

/// Aggregated health of one monitored service, as of its last probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub status: ProbeStatus,
    /// Ping round-trip in milliseconds; 0 unless online.
    pub latency_ms: u64,
    /// Time of the last probe attempt; `None` until the first cycle.
    pub last_check: Option<DateTime<Utc>>,
    /// Port the ping endpoint listens on.
    pub port: Option<u16>,
    pub resources: HostResources,
    pub database: DatabaseInfo,
    pub backup: SnapshotInfo,
    /// Pass-through body of the service's metrics endpoint.
    pub raw_metrics: serde_json::Map<String, serde_json::Value>,
}

impl ServiceStatus {
    /// Offline/unknown record seeded at startup.
    pub fn initial(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ProbeStatus::Offline,
            latency_ms: 0,
            last_check: None,
            port: None,
            resources: HostResources::zeroed(),
            database: DatabaseInfo::unknown("unknown"),
            backup: SnapshotInfo::none_yet(),
            raw_metrics: serde_json::Map::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ProbeStatus::Online
    }
}

/// Headline counts served alongside the per-service records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub online: usize,
    /// `round(100 * online / total)`, 0 when nothing is configured.
    pub healthy_percentage: u32,
}

impl HealthSummary {
    pub fn from_statuses(statuses: &[ServiceStatus]) -> Self {
        let total = statuses.len();
        let online = statuses.iter().filter(|s| s.is_online()).count();
        let healthy_percentage = if total == 0 {
            0
        } else {
            (100.0 * online as f64 / total as f64).round() as u32
        };
        Self {
            total,
            online,
            healthy_percentage,
        }
    }
}
