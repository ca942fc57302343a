//! Probe logic: one bounded ping plus an optional metrics fetch per service.
//!
//! A probe never fails. Transport errors, timeouts, and unparseable bodies
//! degrade the resulting [`ServiceStatus`] instead of propagating.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use http::StatusCode;
use http_body_util::{BodyExt, Empty};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use idwatch_core::ServiceDescriptor;
use idwatch_state::{
    DatabaseInfo, DbStatus, HostResources, ProbeStatus, ResourceSource, ServiceStatus,
    SnapshotInfo,
};

use crate::sampler::ResourceSampler;

/// Why a single HTTP request did not produce a response.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid url {0:?}")]
    InvalidUrl(String),

    #[error("unsupported scheme in {0:?}, only http:// is probed")]
    UnsupportedScheme(String),

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("failed to read body: {0}")]
    Body(#[source] hyper::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Status and fully buffered body of a GET.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Issue a single GET with an overall deadline covering connect, request,
/// and body.
pub async fn http_get(url: &str, timeout: Duration) -> Result<HttpResponse, ProbeError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|_| ProbeError::InvalidUrl(url.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(ProbeError::UnsupportedScheme(url.to_string()));
    }
    let authority = uri
        .authority()
        .cloned()
        .ok_or_else(|| ProbeError::InvalidUrl(url.to_string()))?;
    let address = match authority.port_u16() {
        Some(_) => authority.as_str().to_string(),
        None => format!("{}:80", authority.host()),
    };
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", authority.as_str())
        .header("user-agent", "idwatch-health/0.1")
        .header("accept", "application/json")
        .body(Empty::<Bytes>::new())
        .map_err(|_| ProbeError::InvalidUrl(url.to_string()))?;

    let exchange = async {
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(ProbeError::Connect)?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(ProbeError::Handshake)?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let resp = sender.send_request(req).await.map_err(ProbeError::Request)?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(ProbeError::Body)?
            .to_bytes();
        Ok::<_, ProbeError>(HttpResponse { status, body })
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
}

/// Known keys a service may self-report in its ping body.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SelfReport {
    pub db_status: Option<DbStatus>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
}

impl SelfReport {
    /// Extract known keys; any body that is not a JSON object yields nothing.
    pub fn parse(body: &[u8]) -> Self {
        let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };
        Self {
            db_status: obj
                .get("db_status")
                .and_then(Value::as_str)
                .map(DbStatus::from_reported),
            cpu_percent: obj.get("cpu_percent").and_then(as_percent),
            memory_percent: obj.get("memory_percent").and_then(as_percent),
            disk_percent: obj.get("disk_percent").and_then(as_percent),
        }
    }

    /// Self-reported resources, if the service reported any of them.
    pub fn resources(&self) -> Option<HostResources> {
        if self.cpu_percent.is_none() && self.memory_percent.is_none() && self.disk_percent.is_none()
        {
            return None;
        }
        Some(HostResources {
            cpu_percent: self.cpu_percent.unwrap_or(0.0),
            ram_percent: self.memory_percent.unwrap_or(0.0),
            disk_percent: self.disk_percent.unwrap_or(0.0),
            ip: "remote".to_string(),
            source: ResourceSource::Remote,
        })
    }
}

fn as_percent(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

/// Produces one [`ServiceStatus`] per descriptor.
#[derive(Clone)]
pub struct ProbeClient {
    ping_timeout: Duration,
    metrics_timeout: Duration,
    engine: String,
    sampler: Arc<ResourceSampler>,
}

impl ProbeClient {
    pub fn new(sampler: Arc<ResourceSampler>) -> Self {
        Self {
            ping_timeout: Duration::from_secs(2),
            metrics_timeout: Duration::from_secs(1),
            engine: "SQLite3".to_string(),
            sampler,
        }
    }

    pub fn with_timeouts(mut self, ping: Duration, metrics: Duration) -> Self {
        self.ping_timeout = ping;
        self.metrics_timeout = metrics;
        self
    }

    /// Engine label reported for every service database.
    pub fn with_engine(mut self, engine: &str) -> Self {
        self.engine = engine.to_string();
        self
    }

    /// Probe one service. No retries: a failure waits for the next cycle.
    ///
    /// `backup` is left as the "no backups yet" sentinel for the caller
    /// to fill in.
    pub async fn probe(&self, svc: &ServiceDescriptor) -> ServiceStatus {
        let last_check = Some(Utc::now());
        let start = Instant::now();

        let mut status = ProbeStatus::Offline;
        let mut latency_ms = 0;
        let mut report = SelfReport::default();
        let mut raw_metrics = Map::new();

        match http_get(&svc.ping_url, self.ping_timeout).await {
            Ok(resp) if resp.status == StatusCode::OK => {
                latency_ms = start.elapsed().as_millis() as u64;
                status = ProbeStatus::Online;
                report = SelfReport::parse(&resp.body);
                raw_metrics = self.fetch_metrics(svc).await;
            }
            Ok(resp) => {
                debug!(service = %svc.name, status = %resp.status, "ping returned non-200");
                status = ProbeStatus::Error;
            }
            Err(e) => {
                debug!(service = %svc.name, error = %e, "ping failed");
            }
        }

        let resources = match report.resources() {
            Some(remote) => remote,
            None => self.sample_local().await,
        };

        let size_on_disk = svc
            .database_path()
            .and_then(|p| std::fs::metadata(p).ok())
            .filter(|m| m.is_file())
            .map(|m| m.len());
        let database = DatabaseInfo::resolve(
            &self.engine,
            report.db_status,
            status == ProbeStatus::Online,
            size_on_disk,
        );

        ServiceStatus {
            name: svc.name.clone(),
            status,
            latency_ms,
            last_check,
            port: svc.port(),
            resources,
            database,
            backup: SnapshotInfo::none_yet(),
            raw_metrics,
        }
    }

    /// Secondary, independently timed metrics fetch. Failure only leaves
    /// the map empty.
    async fn fetch_metrics(&self, svc: &ServiceDescriptor) -> Map<String, Value> {
        if svc.metrics_url.is_empty() {
            return Map::new();
        }
        match http_get(&svc.metrics_url, self.metrics_timeout).await {
            Ok(resp) if resp.status.is_success() => {
                match serde_json::from_slice::<Value>(&resp.body) {
                    Ok(Value::Object(map)) => {
                        debug!(service = %svc.name, keys = map.len(), "metrics loaded");
                        map
                    }
                    _ => {
                        debug!(service = %svc.name, "metrics body is not a JSON object");
                        Map::new()
                    }
                }
            }
            Ok(resp) => {
                debug!(service = %svc.name, status = %resp.status, "metrics returned non-2xx");
                Map::new()
            }
            Err(e) => {
                debug!(service = %svc.name, error = %e, "metrics fetch failed");
                Map::new()
            }
        }
    }

    async fn sample_local(&self) -> HostResources {
        let sampler = Arc::clone(&self.sampler);
        tokio::task::spawn_blocking(move || sampler.sample())
            .await
            .unwrap_or_else(|_| HostResources::zeroed())
    }
}
