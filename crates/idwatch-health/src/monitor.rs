//! Health monitor: the background poll loop.
//!
//! One task probes every registered service in registry order, fills in
//! the latest snapshot info, and swaps each record into the [`HealthStore`].
//! Services are probed sequentially, so a cycle takes at most
//! `probe timeout × service count` plus the metrics fetches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use idwatch_backup::BackupManager;
use idwatch_core::ServiceRegistry;
use idwatch_state::{HealthStore, ProbeStatus, SnapshotInfo};

use crate::checker::ProbeClient;

/// Tally of one completed poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub online: usize,
    pub offline: usize,
    pub error: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.online + self.offline + self.error
    }
}

/// Everything one cycle needs; shared with the spawned loop.
struct PollContext {
    registry: ServiceRegistry,
    store: HealthStore,
    prober: ProbeClient,
    backups: Arc<BackupManager>,
}

impl PollContext {
    async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        for svc in self.registry.iter() {
            let mut status = self.prober.probe(svc).await;
            status.backup = self.latest_backup(&svc.name).await;

            match status.status {
                ProbeStatus::Online => report.online += 1,
                ProbeStatus::Offline => report.offline += 1,
                ProbeStatus::Error => report.error += 1,
            }
            debug!(
                service = %svc.name,
                status = ?status.status,
                latency_ms = status.latency_ms,
                "service probed"
            );

            if !self.store.put(status).await {
                warn!(service = %svc.name, "service missing from health store");
            }
        }

        self.store.complete_cycle(Utc::now()).await;
        report.elapsed = started.elapsed();
        report
    }

    /// Snapshot directory scan, off the async workers.
    async fn latest_backup(&self, service: &str) -> SnapshotInfo {
        let backups = Arc::clone(&self.backups);
        let name = service.to_string();
        match tokio::task::spawn_blocking(move || backups.latest(&name)).await {
            Ok(info) => info,
            Err(e) => {
                warn!(service, error = %e, "snapshot scan task failed");
                SnapshotInfo::unavailable()
            }
        }
    }
}

/// Handle to the running loop.
struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Drives the poll cycle on a fixed period until stopped.
pub struct HealthMonitor {
    ctx: Arc<PollContext>,
    interval: Duration,
    slot: Mutex<Option<MonitorSlot>>,
}

impl HealthMonitor {
    pub fn new(
        registry: ServiceRegistry,
        store: HealthStore,
        prober: ProbeClient,
        backups: Arc<BackupManager>,
        interval: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                registry,
                store,
                prober,
                backups,
            }),
            interval,
            slot: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &HealthStore {
        &self.ctx.store
    }

    /// Probe every service once, in registry order.
    pub async fn run_cycle(&self) -> CycleReport {
        self.ctx.run_cycle().await
    }

    /// Spawn the poll loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::clone(&self.ctx);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            run_poll_loop(ctx, interval, shutdown_rx).await;
        });
        *slot = Some(MonitorSlot {
            handle,
            shutdown_tx,
        });

        info!(
            services = self.ctx.registry.len(),
            interval_ms = self.interval.as_millis() as u64,
            "health monitor started"
        );
        true
    }

    /// Signal the loop and wait for it to exit. An in-flight cycle is
    /// allowed to finish.
    pub async fn stop(&self) {
        let Some(slot) = self.slot.lock().await.take() else {
            return;
        };
        let _ = slot.shutdown_tx.send(true);
        if let Err(e) = slot.handle.await {
            warn!(error = %e, "health monitor task ended abnormally");
        }
        info!("health monitor stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

async fn run_poll_loop(
    ctx: Arc<PollContext>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("poll loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let report = ctx.run_cycle().await;
        debug!(
            online = report.online,
            offline = report.offline,
            error = report.error,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "poll cycle complete"
        );

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                // A dropped sender also means stop.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("poll loop shutting down");
}
