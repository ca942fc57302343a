//! idwatch-api: the status API.
//!
//! Serves the health store snapshot and accepts snapshot triggers. The
//! short paths are what the monitor dashboards poll; the versioned paths
//! mirror them under `/api/v1/monitor`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/stats` | Summary plus every service record |
//! | POST | `/backup` | Snapshot one service's database |
//! | GET | `/api/v1/monitor/stats` | Same as `/stats` |
//! | POST | `/api/v1/monitor/backup` | Same as `/backup` |
//! | GET | `/api/v1/monitor/backups/{service}` | List a service's snapshots |
//! | GET | `/api/v1/health` | Liveness of the monitor itself |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use idwatch_backup::BackupManager;
use idwatch_state::HealthStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: HealthStore,
    pub backups: Arc<BackupManager>,
}

/// Build the complete API router (stats, backups, metrics).
pub fn build_router(store: HealthStore, backups: Arc<BackupManager>) -> Router {
    let state = ApiState { store, backups };

    let monitor_routes = Router::new()
        .route("/stats", get(handlers::get_stats))
        .route("/backup", post(handlers::trigger_backup))
        .route("/backups/{service}", get(handlers::list_backups));

    Router::new()
        .route("/stats", get(handlers::get_stats))
        .route("/backup", post(handlers::trigger_backup))
        .nest("/api/v1/monitor", monitor_routes)
        .route("/api/v1/health", get(handlers::self_health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
