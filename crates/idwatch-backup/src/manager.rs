//! Backup manager: creates and inspects per-service database snapshots.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use idwatch_core::{MonitorConfig, normalize_service_name};
use idwatch_state::{BackupState, SnapshotInfo};

use crate::error::{BackupError, BackupResult};

const SNAPSHOT_PREFIX: &str = "snapshot_";
const SNAPSHOT_EXT: &str = ".db";

/// One snapshot file on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub service_name: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    #[serde(skip)]
    pub path: PathBuf,
}

impl SnapshotRecord {
    /// Summarize for the health store.
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            last_snapshot: self.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            created_at: Some(self.created_at),
            size_mb: size_mb(self.size_bytes),
            status: BackupState::Success,
            filename: Some(self.filename.clone()),
        }
    }
}

/// `{success, message}` pair returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotOutcome {
    pub success: bool,
    pub message: String,
}

impl From<BackupResult<SnapshotRecord>> for SnapshotOutcome {
    fn from(result: BackupResult<SnapshotRecord>) -> Self {
        match result {
            Ok(record) => Self {
                success: true,
                message: format!("Snapshot created: {}", record.filename),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Maps service names to database files and manages their snapshots.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    /// normalized service name → database path.
    databases: HashMap<String, PathBuf>,
    /// Snapshots kept per service; `None` keeps all.
    max_snapshots: Option<usize>,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            databases: HashMap::new(),
            max_snapshots: None,
        }
    }

    /// Build from the `[backup]` section and each service's `database` path.
    pub fn from_config(config: &MonitorConfig) -> BackupResult<Self> {
        let mut manager =
            Self::new(&config.backup.root).with_retention(config.backup.max_snapshots);
        for svc in &config.services {
            if let Some(db) = &svc.database {
                manager = manager.with_database(&svc.name, db)?;
            }
        }
        Ok(manager)
    }

    /// Register a service's database. Fails if another name already
    /// claimed the same normalized key.
    pub fn with_database(mut self, service: &str, path: impl Into<PathBuf>) -> BackupResult<Self> {
        match self.databases.entry(normalize_service_name(service)) {
            Entry::Occupied(slot) => Err(BackupError::DuplicateService {
                service: service.to_string(),
                key: slot.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(path.into());
                Ok(self)
            }
        }
    }

    pub fn with_retention(mut self, max_snapshots: Option<usize>) -> Self {
        self.max_snapshots = max_snapshots.filter(|&n| n > 0);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database file configured for a service, if the name is known.
    pub fn resolve_path(&self, service: &str) -> Option<&Path> {
        self.databases
            .get(&normalize_service_name(service))
            .map(PathBuf::as_path)
    }

    /// Directory holding a service's snapshots.
    pub fn snapshot_dir(&self, service: &str) -> PathBuf {
        self.root.join(normalize_service_name(service))
    }

    /// Copy the service's database into a new timestamped snapshot.
    pub fn create_snapshot(&self, service: &str) -> BackupResult<SnapshotRecord> {
        let source = self
            .resolve_path(service)
            .ok_or_else(|| BackupError::UnknownService(service.to_string()))?;
        if !source.is_file() {
            return Err(BackupError::SourceNotFound(source.to_path_buf()));
        }

        let dir = self.snapshot_dir(service);
        fs::create_dir_all(&dir).map_err(BackupError::io(&dir))?;

        let mut partial = tempfile::Builder::new()
            .prefix(".snapshot_")
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(BackupError::io(&dir))?;
        let mut src = File::open(source).map_err(BackupError::io(source))?;
        io::copy(&mut src, partial.as_file_mut()).map_err(BackupError::io(partial.path()))?;
        partial
            .as_file()
            .sync_all()
            .map_err(BackupError::io(partial.path()))?;

        // Link into place without clobbering a snapshot taken the same second.
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0u32;
        let (filename, dest) = loop {
            let filename = if attempt == 0 {
                format!("{SNAPSHOT_PREFIX}{stamp}{SNAPSHOT_EXT}")
            } else {
                format!("{SNAPSHOT_PREFIX}{stamp}_{attempt}{SNAPSHOT_EXT}")
            };
            let dest = dir.join(&filename);
            match partial.persist_noclobber(&dest) {
                Ok(_) => break (filename, dest),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    partial = e.file;
                    attempt += 1;
                }
                Err(e) => return Err(BackupError::io(&dest)(e.error)),
            }
        };

        let record = read_record(service, &dest)
            .map_err(BackupError::io(&dest))?
            .unwrap_or_else(|| SnapshotRecord {
                service_name: service.to_string(),
                filename: filename.clone(),
                created_at: Utc::now(),
                size_bytes: 0,
                path: dest.clone(),
            });
        info!(
            service,
            filename = %record.filename,
            size_bytes = record.size_bytes,
            "snapshot created"
        );

        self.prune(service, &record.filename);
        Ok(record)
    }

    /// All snapshots for a service, newest first.
    pub fn list(&self, service: &str) -> BackupResult<Vec<SnapshotRecord>> {
        let dir = self.snapshot_dir(service);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&dir)(e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(BackupError::io(&dir))?;
            if let Some(record) = read_record(service, &entry.path()).map_err(BackupError::io(entry.path()))? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| name_order(&b.filename).cmp(&name_order(&a.filename)))
        });
        Ok(records)
    }

    /// Most recent snapshot, or the "no backups yet" sentinel.
    pub fn latest(&self, service: &str) -> SnapshotInfo {
        match self.list(service) {
            Ok(records) => records
                .first()
                .map(SnapshotRecord::info)
                .unwrap_or_else(SnapshotInfo::none_yet),
            Err(e) => {
                warn!(service, error = %e, "failed to scan snapshots");
                SnapshotInfo::unavailable()
            }
        }
    }

    /// Drop the oldest snapshots beyond the retention count. `fresh` is
    /// always one of the kept, whatever the other files' mtimes say.
    fn prune(&self, service: &str, fresh: &str) {
        let Some(keep) = self.max_snapshots else {
            return;
        };
        let records = match self.list(service) {
            Ok(records) => records,
            Err(e) => {
                warn!(service, error = %e, "retention scan failed");
                return;
            }
        };
        let older = records.iter().filter(|r| r.filename != fresh);
        for old in older.skip(keep.saturating_sub(1)) {
            match fs::remove_file(&old.path) {
                Ok(()) => debug!(service, filename = %old.filename, "pruned snapshot"),
                Err(e) => warn!(service, filename = %old.filename, error = %e, "failed to prune snapshot"),
            }
        }
    }
}

fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(SNAPSHOT_EXT)
}

/// Sort key for snapshot names: the stamp, then the numeric `_N` suffix
/// added for same-second snapshots, so `_10` ranks above `_9`.
fn name_order(filename: &str) -> (&str, u32) {
    let stem = filename
        .strip_prefix(SNAPSHOT_PREFIX)
        .and_then(|s| s.strip_suffix(SNAPSHOT_EXT))
        .unwrap_or(filename);
    // `%Y%m%d_%H%M%S` is 15 bytes.
    match (stem.get(..15), stem.get(15..).and_then(|s| s.strip_prefix('_'))) {
        (Some(stamp), Some(seq)) => match seq.parse() {
            Ok(seq) => (stamp, seq),
            Err(_) => (stem, 0),
        },
        _ => (stem, 0),
    }
}

/// Stat a directory entry; `None` if it is not a snapshot file.
fn read_record(service: &str, path: &Path) -> io::Result<Option<SnapshotRecord>> {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    if !is_snapshot_name(filename) {
        return Ok(None);
    }
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Ok(None);
    }
    Ok(Some(SnapshotRecord {
        service_name: service.to_string(),
        filename: filename.to_string(),
        created_at: DateTime::<Utc>::from(meta.modified()?),
        size_bytes: meta.len(),
        path: path.to_path_buf(),
    }))
}

/// Bytes → MiB, two decimals.
fn size_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    use idwatch_state::NO_BACKUPS_LABEL;

    struct Fixture {
        _dir: tempfile::TempDir,
        manager: BackupManager,
        db: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("auth-service").join("db.sqlite3");
        fs::create_dir_all(db.parent().unwrap()).unwrap();
        fs::write(&db, b"SQLite format 3\0citizen records").unwrap();
        let manager = BackupManager::new(dir.path().join("backups"))
            .with_database("Auth Service", &db)
            .unwrap();
        Fixture {
            _dir: dir,
            manager,
            db,
        }
    }

    fn write_snapshot(dir: &Path, name: &str, bytes: usize, mtime: SystemTime) {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, vec![0u8; bytes]).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[test]
    fn resolve_path_known_and_unknown() {
        let f = fixture();
        assert_eq!(f.manager.resolve_path("Auth Service"), Some(f.db.as_path()));
        assert_eq!(f.manager.resolve_path("auth_service"), Some(f.db.as_path()));
        assert!(f.manager.resolve_path("ghost-service").is_none());
    }

    #[test]
    fn unknown_service_creates_nothing() {
        let f = fixture();
        let err = f.manager.create_snapshot("ghost-service").unwrap_err();
        assert!(matches!(err, BackupError::UnknownService(_)));

        let outcome = SnapshotOutcome::from(Err(err));
        assert!(!outcome.success);
        assert!(outcome.message.contains("not found"));
        assert!(!f.manager.root().exists());
    }

    #[test]
    fn missing_source_file_fails_fast() {
        let f = fixture();
        fs::remove_file(&f.db).unwrap();
        let err = f.manager.create_snapshot("Auth Service").unwrap_err();
        assert!(matches!(err, BackupError::SourceNotFound(_)));
        assert!(err.to_string().contains("not found"));
        assert!(!f.manager.snapshot_dir("Auth Service").exists());
    }

    #[test]
    fn snapshot_copies_bytes() {
        let f = fixture();
        let record = f.manager.create_snapshot("Auth Service").unwrap();

        assert!(record.filename.starts_with("snapshot_"));
        assert!(record.filename.ends_with(".db"));
        assert_eq!(record.path.parent().unwrap(), f.manager.root().join("auth_service"));
        assert_eq!(fs::read(&record.path).unwrap(), fs::read(&f.db).unwrap());
        assert_eq!(record.size_bytes, fs::metadata(&f.db).unwrap().len());

        let outcome = SnapshotOutcome::from(Ok(record.clone()));
        assert!(outcome.success);
        assert!(outcome.message.contains(&record.filename));
    }

    #[test]
    fn back_to_back_snapshots_do_not_overwrite() {
        let f = fixture();
        let a = f.manager.create_snapshot("Auth Service").unwrap();
        let b = f.manager.create_snapshot("Auth Service").unwrap();
        assert_ne!(a.filename, b.filename);
        assert_eq!(f.manager.list("Auth Service").unwrap().len(), 2);
    }

    #[test]
    fn no_partial_files_left_behind() {
        let f = fixture();
        f.manager.create_snapshot("Auth Service").unwrap();
        let leftovers: Vec<_> = fs::read_dir(f.manager.snapshot_dir("Auth Service"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn latest_without_directory_is_sentinel() {
        let f = fixture();
        let info = f.manager.latest("service-with-no-backups");
        assert_eq!(info.last_snapshot, NO_BACKUPS_LABEL);
        assert_eq!(info.size_mb, 0.0);
        assert_eq!(info.status, BackupState::Idle);
        assert!(info.filename.is_none());
    }

    #[test]
    fn latest_with_empty_directory_is_sentinel() {
        let f = fixture();
        fs::create_dir_all(f.manager.snapshot_dir("id-service")).unwrap();
        assert_eq!(f.manager.latest("id-service").last_snapshot, NO_BACKUPS_LABEL);
    }

    #[test]
    fn latest_picks_newest_creation_time() {
        let f = fixture();
        let dir = f.manager.snapshot_dir("audit-service");
        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let t2 = t1 + Duration::from_secs(60);
        let t3 = t2 + Duration::from_secs(60);
        // Names deliberately out of order relative to their times.
        write_snapshot(&dir, "snapshot_20990101_000000.db", 10, t1);
        write_snapshot(&dir, "snapshot_20000101_000000.db", 3 * 1024 * 1024, t3);
        write_snapshot(&dir, "snapshot_20500101_000000.db", 10, t2);

        let info = f.manager.latest("audit-service");
        assert_eq!(info.filename.as_deref(), Some("snapshot_20000101_000000.db"));
        assert_eq!(info.status, BackupState::Success);
        assert_eq!(info.size_mb, 3.0);
        assert_eq!(info.created_at, Some(DateTime::<Utc>::from(t3)));
    }

    #[test]
    fn latest_ignores_foreign_files() {
        let f = fixture();
        let dir = f.manager.snapshot_dir("verify-service");
        let now = SystemTime::now();
        write_snapshot(&dir, "notes.txt", 10, now);
        write_snapshot(&dir, ".snapshot_abc.partial", 10, now);
        assert_eq!(f.manager.latest("verify-service").last_snapshot, NO_BACKUPS_LABEL);
    }

    #[test]
    fn size_rounds_to_two_decimals() {
        assert_eq!(size_mb(0), 0.0);
        assert_eq!(size_mb(1024 * 1024), 1.0);
        assert_eq!(size_mb(1_500_000), 1.43);
    }

    #[test]
    fn retention_keeps_newest() {
        let f = fixture();
        let manager = f.manager.clone().with_retention(Some(2));
        let dir = manager.snapshot_dir("Auth Service");
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_snapshot(&dir, "snapshot_20231114_000000.db", 1, base);
        write_snapshot(&dir, "snapshot_20231114_000100.db", 1, base + Duration::from_secs(60));

        let fresh = manager.create_snapshot("Auth Service").unwrap();
        let remaining: Vec<_> = manager
            .list("Auth Service")
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(remaining, vec![fresh.filename, "snapshot_20231114_000100.db".to_string()]);
    }

    #[test]
    fn retention_never_drops_fresh_snapshot() {
        let f = fixture();
        let manager = f.manager.clone().with_retention(Some(1));
        let dir = manager.snapshot_dir("Auth Service");
        // mtime ahead of the wall clock, e.g. restored from another host.
        let ahead = SystemTime::now() + Duration::from_secs(3600);
        write_snapshot(&dir, "snapshot_20991231_235959.db", 1, ahead);

        let fresh = manager.create_snapshot("Auth Service").unwrap();
        assert!(fresh.path.is_file());
        let remaining: Vec<_> = manager
            .list("Auth Service")
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(remaining, vec![fresh.filename]);
        assert_eq!(manager.latest("Auth Service").status, BackupState::Success);
    }

    #[test]
    fn same_second_suffixes_order_numerically() {
        let f = fixture();
        let dir = f.manager.snapshot_dir("Auth Service");
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for name in [
            "snapshot_20231114_221320.db",
            "snapshot_20231114_221320_2.db",
            "snapshot_20231114_221320_9.db",
            "snapshot_20231114_221320_10.db",
        ] {
            write_snapshot(&dir, name, 1, at);
        }

        let names: Vec<_> = f
            .manager
            .list("Auth Service")
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(
            names,
            vec![
                "snapshot_20231114_221320_10.db",
                "snapshot_20231114_221320_9.db",
                "snapshot_20231114_221320_2.db",
                "snapshot_20231114_221320.db",
            ]
        );
        assert_eq!(
            f.manager.latest("Auth Service").filename.as_deref(),
            Some("snapshot_20231114_221320_10.db")
        );
    }

    #[test]
    fn duplicate_database_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path())
            .with_database("id service", "/srv/a.sqlite3")
            .unwrap();
        let err = manager
            .clone()
            .with_database("ID_Service", "/srv/b.sqlite3")
            .unwrap_err();
        assert!(matches!(
            err,
            BackupError::DuplicateService { ref service, ref key }
                if service == "ID_Service" && key == "id_service"
        ));
        assert_eq!(manager.resolve_path("id_service"), Some(Path::new("/srv/a.sqlite3")));
    }

    #[test]
    fn from_config_maps_databases() {
        let mut config = MonitorConfig::default();
        config.backup.root = PathBuf::from("/var/lib/idwatch/backups");
        config.services.push(
            idwatch_core::ServiceDescriptor::new("id-service", "http://127.0.0.1:8001/health", "")
                .with_database("/srv/id-service/db.sqlite3"),
        );
        config.services.push(idwatch_core::ServiceDescriptor::new(
            "iprs-mock",
            "http://127.0.0.1:8005/citizens",
            "",
        ));

        let manager = BackupManager::from_config(&config).unwrap();
        assert_eq!(manager.root(), Path::new("/var/lib/idwatch/backups"));
        assert_eq!(
            manager.resolve_path("id-service"),
            Some(Path::new("/srv/id-service/db.sqlite3"))
        );
        assert!(manager.resolve_path("iprs-mock").is_none());
    }
}
