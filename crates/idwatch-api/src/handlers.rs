//! HTTP handlers.
//!
//! Reads go straight to the `HealthStore` snapshot. Snapshot creation is
//! blocking file I/O and runs on the blocking pool.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use idwatch_backup::SnapshotOutcome;
use idwatch_state::{HealthSummary, ServiceStatus};

use crate::ApiState;

/// Response wrapper for the list endpoints.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// A `{success: false, message}` rejection in the shape backup callers expect.
fn backup_rejection(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(SnapshotOutcome {
            success: false,
            message: msg.to_string(),
        }),
    )
        .into_response()
}

// ── Stats ──────────────────────────────────────────────────────

/// Body of `GET /stats`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub summary: HealthSummary,
    pub nodes: Vec<ServiceStatus>,
    pub updated_at: DateTime<Utc>,
}

/// GET /stats
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let snapshot = state.store.snapshot().await;
    Json(StatsResponse {
        summary: snapshot.summary(),
        nodes: snapshot.services.clone(),
        updated_at: Utc::now(),
    })
}

// ── Backups ────────────────────────────────────────────────────

/// Backup trigger body. `service_name` is optional here so that a missing
/// field can be answered with the same 400 as malformed JSON.
#[derive(Debug, Deserialize)]
pub struct BackupRequest {
    #[serde(default)]
    pub service_name: Option<String>,
}

/// POST /backup
///
/// 400 when the body is unusable; otherwise 200 with whatever the backup
/// manager reported, success or not.
pub async fn trigger_backup(
    State(state): State<ApiState>,
    body: Result<Json<BackupRequest>, JsonRejection>,
) -> axum::response::Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected backup request body");
            return backup_rejection(&rejection.body_text(), StatusCode::BAD_REQUEST);
        }
    };
    let Some(service) = req.service_name.filter(|s| !s.trim().is_empty()) else {
        return backup_rejection("service_name is required", StatusCode::BAD_REQUEST);
    };

    let backups = state.backups.clone();
    let name = service.clone();
    let outcome = match tokio::task::spawn_blocking(move || backups.create_snapshot(&name)).await {
        Ok(result) => SnapshotOutcome::from(result),
        Err(e) => {
            warn!(service = %service, error = %e, "snapshot task failed");
            return backup_rejection("snapshot task failed", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if outcome.success {
        info!(service = %service, message = %outcome.message, "backup triggered");
    } else {
        warn!(service = %service, message = %outcome.message, "backup failed");
    }
    Json(outcome).into_response()
}

/// GET /api/v1/monitor/backups/{service}
pub async fn list_backups(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> impl IntoResponse {
    if state.backups.resolve_path(&service).is_none() {
        return error_response("service not found", StatusCode::NOT_FOUND).into_response();
    }
    let backups = state.backups.clone();
    match tokio::task::spawn_blocking(move || backups.list(&service)).await {
        Ok(Ok(records)) => ApiResponse::ok(records).into_response(),
        Ok(Err(e)) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Self ───────────────────────────────────────────────────────

/// GET /api/v1/health
///
/// Shaped like the ping contract the monitored services follow, so the
/// monitor can watch itself.
pub async fn self_health(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot().await;
    Json(serde_json::json!({
        "status": "online",
        "service": "idwatch",
        "services_monitored": snapshot.services.len(),
        "cycles_completed": snapshot.cycles_completed,
        "last_cycle_at": snapshot.last_cycle_at,
    }))
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot().await;
    let body = crate::prometheus::render_prometheus(&snapshot);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
