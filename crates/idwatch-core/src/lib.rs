//! idwatch-core: configuration and registry types shared by every idwatch crate.
//!
//! The monitor is configured by a single TOML file listing the backend
//! services to probe, the poll timing, and where database snapshots live.
//! [`MonitorConfig`] parses and validates it; [`ServiceRegistry`] is the
//! immutable, ordered view of the monitored targets handed to the poller.

pub mod config;
pub mod types;

pub use config::{ConfigError, MonitorConfig, parse_duration};
pub use types::*;
