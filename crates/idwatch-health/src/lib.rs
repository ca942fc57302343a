//! idwatch-health: probing and the periodic poll loop.
//!
//! Every cycle walks the service registry in order, pings each service
//! with a bounded GET, optionally pulls its metrics document, and writes
//! one [`idwatch_state::ServiceStatus`] per service into the shared store.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   └── single background task (watch-channel shutdown)
//!       ├── ProbeClient::probe() → ServiceStatus
//!       │   ├── http_get(ping_url)     online / offline / error
//!       │   ├── http_get(metrics_url)  raw_metrics (best effort)
//!       │   └── ResourceSampler        when the service self-reports nothing
//!       ├── BackupManager::latest()    backup block
//!       └── HealthStore::put()
//! ```

pub mod checker;
pub mod monitor;
pub mod sampler;

#[cfg(test)]
mod testing;

pub use checker::{HttpResponse, ProbeClient, ProbeError, SelfReport, http_get};
pub use monitor::{CycleReport, HealthMonitor};
pub use sampler::ResourceSampler;
