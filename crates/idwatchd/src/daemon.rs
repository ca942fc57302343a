//! Subcommand bodies. `run` is the composition root for the long-lived
//! process; the others are one-shot operations over the same parts.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use idwatch_api::handlers::StatsResponse;
use idwatch_backup::{BackupManager, SnapshotOutcome};
use idwatch_core::MonitorConfig;
use idwatch_health::{HealthMonitor, ProbeClient, ResourceSampler};
use idwatch_state::HealthStore;

/// The assembled monitor, minus the HTTP listener.
struct Parts {
    config: MonitorConfig,
    store: HealthStore,
    backups: Arc<BackupManager>,
    monitor: HealthMonitor,
}

fn load_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    let config = MonitorConfig::from_file(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    info!(
        path = %path.display(),
        services = config.services.len(),
        backup_root = %config.backup.root.display(),
        "config loaded"
    );
    Ok(config)
}

fn assemble(config: MonitorConfig) -> anyhow::Result<Parts> {
    let registry = config.registry();
    let store = HealthStore::from_registry(&registry);
    let backups = BackupManager::from_config(&config).context("mapping service databases")?;
    let backups = Arc::new(backups);

    let prober = ProbeClient::new(Arc::new(ResourceSampler::new()))
        .with_timeouts(config.probe_timeout(), config.metrics_timeout())
        .with_engine(&config.backup.engine);

    let monitor = HealthMonitor::new(
        registry,
        store.clone(),
        prober,
        backups.clone(),
        config.interval(),
    );

    Ok(Parts {
        config,
        store,
        backups,
        monitor,
    })
}

/// Poll loop plus status API until Ctrl-C.
pub async fn run(config_path: &Path, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    info!("idwatch daemon starting");

    let parts = assemble(load_config(config_path)?)?;
    let addr = listen.unwrap_or(parts.config.monitor.listen);
    if parts.config.services.is_empty() {
        warn!("no services configured; stats will stay empty");
    }

    // ── Start background tasks ─────────────────────────────────

    parts.monitor.start().await;

    // ── Start API server ───────────────────────────────────────

    let router = idwatch_api::build_router(parts.store.clone(), parts.backups.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "status API listening");

    // Graceful shutdown on Ctrl-C.
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await;

    // Stop polling even if the server failed.
    parts.monitor.stop().await;
    served.context("status API server failed")?;

    info!("idwatch daemon stopped");
    Ok(())
}

/// One poll cycle, stats JSON on stdout.
pub async fn once(config_path: &Path) -> anyhow::Result<()> {
    let parts = assemble(load_config(config_path)?)?;

    let report = parts.monitor.run_cycle().await;
    info!(
        online = report.online,
        offline = report.offline,
        error = report.error,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "cycle finished"
    );

    let snapshot = parts.store.snapshot().await;
    let stats = StatsResponse {
        summary: snapshot.summary(),
        nodes: snapshot.services.clone(),
        updated_at: Utc::now(),
    };
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// One snapshot, outcome JSON on stdout. Exits non-zero on failure.
pub async fn snapshot(config_path: &Path, service: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let backups = BackupManager::from_config(&config).context("mapping service databases")?;

    let name = service.to_string();
    let result = tokio::task::spawn_blocking(move || backups.create_snapshot(&name))
        .await
        .context("snapshot task panicked")?;
    let outcome = SnapshotOutcome::from(result);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        anyhow::bail!("snapshot of {service} failed");
    }
    Ok(())
}

/// Validate the config and echo it back with defaults applied.
pub fn check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
