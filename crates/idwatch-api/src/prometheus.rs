//! Prometheus text exposition format.
//!
//! Renders the health store snapshot for scraping by a Prometheus server
//! or compatible agent.

use std::fmt::Write as _;

use idwatch_state::{ProbeStatus, ServiceStatus, StoreSnapshot};

/// One per-service gauge family.
struct Gauge {
    name: &'static str,
    help: &'static str,
    value: fn(&ServiceStatus) -> String,
}

const SERVICE_GAUGES: &[Gauge] = &[
    Gauge {
        name: "idwatch_service_up",
        help: "1 if the last ping returned 200, else 0.",
        value: |s| u8::from(s.status == ProbeStatus::Online).to_string(),
    },
    Gauge {
        name: "idwatch_service_latency_ms",
        help: "Ping round-trip in milliseconds.",
        value: |s| s.latency_ms.to_string(),
    },
    Gauge {
        name: "idwatch_service_cpu_percent",
        help: "CPU utilisation reported for the service host.",
        value: |s| format!("{:.1}", s.resources.cpu_percent),
    },
    Gauge {
        name: "idwatch_service_ram_percent",
        help: "Memory utilisation reported for the service host.",
        value: |s| format!("{:.1}", s.resources.ram_percent),
    },
    Gauge {
        name: "idwatch_service_disk_percent",
        help: "Disk utilisation reported for the service host.",
        value: |s| format!("{:.1}", s.resources.disk_percent),
    },
    Gauge {
        name: "idwatch_database_size_bytes",
        help: "Size of the service database on disk.",
        value: |s| s.database.size_on_disk.to_string(),
    },
    Gauge {
        name: "idwatch_backup_size_mb",
        help: "Size of the newest snapshot in MiB.",
        value: |s| format!("{:.2}", s.backup.size_mb),
    },
];

/// Render the snapshot into Prometheus text format.
///
/// Per-service gauges carry a `service` label; the summary figures are
/// unlabelled.
pub fn render_prometheus(snapshot: &StoreSnapshot) -> String {
    let mut out = String::new();

    for gauge in SERVICE_GAUGES {
        let _ = writeln!(out, "# HELP {} {}", gauge.name, gauge.help);
        let _ = writeln!(out, "# TYPE {} gauge", gauge.name);
        for s in &snapshot.services {
            let _ = writeln!(
                out,
                "{}{{service=\"{}\"}} {}",
                gauge.name,
                escape_label(&s.name),
                (gauge.value)(s)
            );
        }
    }

    let summary = snapshot.summary();
    out.push_str("# HELP idwatch_healthy_percentage Share of services online, 0-100.\n");
    out.push_str("# TYPE idwatch_healthy_percentage gauge\n");
    let _ = writeln!(out, "idwatch_healthy_percentage {}", summary.healthy_percentage);

    out.push_str("# HELP idwatch_poll_cycles_total Poll cycles completed since startup.\n");
    out.push_str("# TYPE idwatch_poll_cycles_total counter\n");
    let _ = writeln!(out, "idwatch_poll_cycles_total {}", snapshot.cycles_completed);

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
