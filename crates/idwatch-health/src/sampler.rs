//! Local host resource sampling, used when a service does not self-report.

use std::net::IpAddr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use sysinfo::{Disks, System};
use tracing::debug;

use idwatch_state::{HostResources, ResourceSource};

const FALLBACK_IP: &str = "127.0.0.1";

/// Samples CPU, memory, and root-disk utilisation of the monitor's host.
///
/// CPU usage is a delta between refreshes, so one sampler should live for
/// the whole process; the first reading after construction may be 0.
pub struct ResourceSampler {
    system: Mutex<System>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Take a reading. Never fails: unavailable figures are reported as 0
    /// and the address falls back to loopback.
    pub fn sample(&self) -> HostResources {
        let (cpu, ram) = {
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_cpu();
            system.refresh_memory();
            let cpu = f64::from(system.global_cpu_info().cpu_usage());
            let ram = percent(system.used_memory(), system.total_memory());
            (cpu, ram)
        };

        HostResources {
            cpu_percent: round1(cpu),
            ram_percent: round1(ram),
            disk_percent: round1(root_disk_percent()),
            ip: primary_ip().map_or_else(|| FALLBACK_IP.to_string(), |ip| ip.to_string()),
            source: ResourceSource::Local,
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Usage of the filesystem mounted at `/`, or of the first disk listed.
fn root_disk_percent() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.list().first());
    match disk {
        Some(d) => percent(d.total_space().saturating_sub(d.available_space()), d.total_space()),
        None => {
            debug!("no disks visible to sampler");
            0.0
        }
    }
}

/// First non-loopback IPv4 address of this host.
fn primary_ip() -> Option<IpAddr> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| debug!(error = %e, "failed to enumerate interfaces"))
        .ok()?;
    interfaces
        .iter()
        .filter(|i| !i.is_loopback())
        .map(|i| i.ip())
        .find(IpAddr::is_ipv4)
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

fn round1(v: f64) -> f64 {
    if v.is_finite() {
        (v * 10.0).round() / 10.0
    } else {
        0.0
    }
}
