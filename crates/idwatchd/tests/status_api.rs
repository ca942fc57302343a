//! Status API regression tests.
//!
//! Drives real poll cycles against local stand-in services, then checks
//! what the router serves.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use tower::ServiceExt;

use idwatch_api::build_router;
use idwatch_api::handlers::StatsResponse;
use idwatch_backup::BackupManager;
use idwatch_core::{MonitorConfig, ServiceDescriptor, ServiceRegistry};
use idwatch_health::{HealthMonitor, ProbeClient, ResourceSampler};
use idwatch_state::{HealthStore, ProbeStatus};

/// A service that answers its ping with a self-report.
async fn spawn_service() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let router = Router::new().route(
        "/api/health",
        get(|| async { axum::Json(serde_json::json!({"status": "online", "db_status": "ok"})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (addr, handle)
}

async fn refused_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

struct Harness {
    router: Router,
    monitor: HealthMonitor,
    backups: Arc<BackupManager>,
    dir: tempfile::TempDir,
    servers: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        for s in &self.servers {
            s.abort();
        }
    }
}

/// Two reachable services and one whose port is closed.
async fn harness() -> Harness {
    let (a, ha) = spawn_service().await;
    let (b, hb) = spawn_service().await;
    let down = refused_addr().await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("auth.sqlite3");
    std::fs::write(&db, vec![0u8; 1024]).unwrap();

    let registry = ServiceRegistry::new(vec![
        ServiceDescriptor::new("auth-service", &format!("http://{a}/api/health"), "")
            .with_database(&db),
        ServiceDescriptor::new("id-service", &format!("http://{b}/api/health"), ""),
        ServiceDescriptor::new("audit-service", &format!("http://{down}/api/health"), ""),
    ]);
    let store = HealthStore::from_registry(&registry);
    let backups = Arc::new(
        BackupManager::new(dir.path().join("backups"))
            .with_database("auth-service", &db)
            .unwrap(),
    );
    let prober = ProbeClient::new(Arc::new(ResourceSampler::new()))
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(300));
    let monitor = HealthMonitor::new(
        registry,
        store.clone(),
        prober,
        backups.clone(),
        Duration::from_millis(50),
    );

    Harness {
        router: build_router(store, backups.clone()),
        monitor,
        backups,
        dir,
        servers: vec![ha, hb],
    }
}

async fn get_stats(router: &Router) -> StatsResponse {
    let req = Request::builder().uri("/stats").body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_backup(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn stats_before_first_cycle_lists_every_service_offline() {
    let h = harness().await;
    let stats = get_stats(&h.router).await;
    assert_eq!(stats.summary.total, 3);
    assert_eq!(stats.summary.online, 0);
    assert_eq!(stats.summary.healthy_percentage, 0);
    assert!(stats.nodes.iter().all(|n| n.last_check.is_none()));
}

#[tokio::test]
async fn stats_after_cycle_reports_two_of_three_online() {
    let h = harness().await;
    h.monitor.run_cycle().await;

    let stats = get_stats(&h.router).await;
    assert_eq!(stats.summary.total, 3);
    assert_eq!(stats.summary.online, 2);
    assert_eq!(stats.summary.healthy_percentage, 67);

    let names: Vec<_> = stats.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["auth-service", "id-service", "audit-service"]);

    let audit = &stats.nodes[2];
    assert_eq!(audit.status, ProbeStatus::Offline);
    assert_eq!(audit.latency_ms, 0);
    assert_eq!(stats.nodes[0].database.size_on_disk, 1024);
}

#[tokio::test]
async fn versioned_stats_path_matches() {
    let h = harness().await;
    h.monitor.run_cycle().await;

    let req = Request::builder()
        .uri("/api/v1/monitor/stats")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let stats: StatsResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats.summary.healthy_percentage, 67);
}

#[tokio::test]
async fn running_loop_keeps_cycling_with_a_dead_service() {
    let h = harness().await;
    assert!(h.monitor.start().await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.monitor.store().snapshot().await.cycles_completed < 3 {
        assert!(tokio::time::Instant::now() < deadline, "poll loop stalled");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    h.monitor.stop().await;

    let stats = get_stats(&h.router).await;
    assert_eq!(stats.nodes.len(), 3);
    assert_eq!(stats.summary.online, 2);
}

#[tokio::test]
async fn backup_missing_service_name_is_400_and_touches_nothing() {
    let h = harness().await;

    let resp = h.router.clone().oneshot(post_backup("/backup", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .router
        .clone()
        .oneshot(post_backup("/backup", "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(!h.dir.path().join("backups").exists());
}

#[tokio::test]
async fn backup_ghost_service_fails_without_files() {
    let h = harness().await;
    let resp = h
        .router
        .clone()
        .oneshot(post_backup("/backup", r#"{"service_name":"ghost-service"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("not found"));
    assert!(!h.dir.path().join("backups").exists());
}

#[tokio::test]
async fn backup_then_cycle_surfaces_snapshot_in_stats() {
    let h = harness().await;
    let resp = h
        .router
        .clone()
        .oneshot(post_backup(
            "/api/v1/monitor/backup",
            r#"{"service_name":"auth-service"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.backups.list("auth-service").unwrap().len(), 1);

    h.monitor.run_cycle().await;
    let stats = get_stats(&h.router).await;
    let auth = &stats.nodes[0];
    assert!(auth.backup.filename.as_deref().unwrap().starts_with("snapshot_"));
    assert_ne!(auth.backup.last_snapshot, "No backups yet");
    assert_eq!(stats.nodes[1].backup.last_snapshot, "No backups yet");
    assert_eq!(stats.nodes[1].backup.size_mb, 0.0);

    let req = Request::builder()
        .uri("/api/v1/monitor/backups/auth-service")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_and_self_health_respond() {
    let h = harness().await;
    h.monitor.run_cycle().await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("idwatch_service_up{service=\"audit-service\"} 0"));
    assert!(text.contains("idwatch_healthy_percentage 67"));

    let req = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[test]
fn sample_config_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/idwatch.toml");
    let config = MonitorConfig::from_file(&path).unwrap();
    assert_eq!(config.services.len(), 6);
    assert_eq!(config.interval(), Duration::from_secs(3));
    let backups = BackupManager::from_config(&config).unwrap();
    assert!(backups.resolve_path("auth-service").is_some());
}
