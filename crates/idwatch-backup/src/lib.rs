//! idwatch-backup: on-demand snapshots of each monitored service's database.
//!
//! Snapshots are plain byte copies of the service's database file, laid out
//! as:
//!
//! ```text
//! <backup_root>/<normalized_service_name>/snapshot_<YYYYMMDD_HHMMSS>.db
//! ```
//!
//! A snapshot is written to a hidden partial file first and linked into
//! place without clobbering, so concurrent triggers for the same service
//! yield two distinct files and readers never observe a half-written one.
//! "Latest" is the snapshot with the newest modification time; snapshots
//! are never rewritten, so that is their creation time.

pub mod error;
pub mod manager;

pub use error::{BackupError, BackupResult};
pub use idwatch_core::normalize_service_name;
pub use manager::{BackupManager, SnapshotOutcome, SnapshotRecord};
