//! Error types for snapshot operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("source not found: no database configured for service {0:?}")]
    UnknownService(String),

    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("service {service:?} maps to {key:?}, which already has a database")]
    DuplicateService { service: String, key: String },

    #[error("snapshot I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
