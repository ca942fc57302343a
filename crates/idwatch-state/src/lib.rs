//! idwatch-state: health data model and the in-memory health store.
//!
//! # Architecture
//!
//! ```text
//! HealthStore (Clone, shared by poller and API)
//!   └── RwLock<Arc<StoreSnapshot>>
//!         ├── services: Vec<ServiceStatus>   (registry order, fixed set)
//!         ├── cycles_completed
//!         └── last_cycle_at
//! ```
//!
//! The poller is the only writer. Each write swaps one whole
//! [`ServiceStatus`]; readers take an `Arc` to the current snapshot and
//! release the lock immediately. Nothing is persisted: health data is
//! rebuilt from scratch after a restart.

pub mod store;
pub mod types;

pub use store::{HealthStore, StoreSnapshot};
pub use types::*;
