//! HealthStore: in-memory map of service name to latest [`ServiceStatus`].
//!
//! Single writer (the poller), many readers (API handlers). Readers receive
//! an immutable `Arc<StoreSnapshot>`; the writer copies-on-write and swaps
//! whole records, so a reader never sees a record that mixes two probes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use idwatch_core::ServiceRegistry;

use crate::types::{HealthSummary, ServiceStatus};

/// Point-in-time view of every tracked service, in registry order.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub services: Vec<ServiceStatus>,
    /// Poll cycles completed since startup.
    pub cycles_completed: u64,
    /// When the last full cycle finished.
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl StoreSnapshot {
    pub fn get(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary::from_statuses(&self.services)
    }
}

/// Thread-safe health store. `Clone` shares the same underlying state.
#[derive(Clone)]
pub struct HealthStore {
    current: Arc<RwLock<Arc<StoreSnapshot>>>,
    /// name → position in `services`; fixed at construction.
    index: Arc<HashMap<String, usize>>,
}

impl HealthStore {
    /// Seed one offline record per name. Duplicate names are collapsed.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = HashMap::new();
        let mut services = Vec::new();
        for name in names {
            let name = name.into();
            if index.contains_key(&name) {
                continue;
            }
            index.insert(name.clone(), services.len());
            services.push(ServiceStatus::initial(&name));
        }
        debug!(services = services.len(), "health store seeded");

        Self {
            current: Arc::new(RwLock::new(Arc::new(StoreSnapshot {
                services,
                cycles_completed: 0,
                last_cycle_at: None,
            }))),
            index: Arc::new(index),
        }
    }

    pub fn from_registry(registry: &ServiceRegistry) -> Self {
        Self::new(registry.names())
    }

    /// Replace the record for `status.name` as a whole.
    ///
    /// Returns `false` (and stores nothing) for names not seeded at
    /// construction; the set of tracked services never changes.
    pub async fn put(&self, status: ServiceStatus) -> bool {
        let Some(&idx) = self.index.get(&status.name) else {
            warn!(service = %status.name, "ignoring status for untracked service");
            return false;
        };
        let mut current = self.current.write().await;
        Arc::make_mut(&mut *current).services[idx] = status;
        true
    }

    /// Mark the end of a poll cycle.
    pub async fn complete_cycle(&self, at: DateTime<Utc>) {
        let mut current = self.current.write().await;
        let snapshot = Arc::make_mut(&mut *current);
        snapshot.cycles_completed += 1;
        snapshot.last_cycle_at = Some(at);
    }

    /// Capture the current state. Never waits on a poll cycle, only on
    /// an in-progress record swap.
    pub async fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn get(&self, name: &str) -> Option<ServiceStatus> {
        let idx = *self.index.get(name)?;
        let current = self.current.read().await;
        current.services.get(idx).cloned()
    }

    /// Number of tracked services.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}
