//! Prometheus-compatible fleet metrics
//!
//! Counters are fed by the fleet event notifier. Optionally exposed over a
//! tiny HTTP endpoint: http://localhost:<METRICS_PORT>/metrics

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::fleet::events::DisconnectReason;

/// Login latency samples kept for percentiles
const LATENCY_HISTORY: usize = 1000;

/// Metrics registry for a fleet run
#[derive(Debug)]
pub struct FleetMetrics {
    // Launch and login
    pub bots_launched: AtomicU64,
    pub login_attempts: AtomicU64,
    pub logins_succeeded: AtomicU64,
    pub login_failures: AtomicU64,

    // Session lifecycle
    pub bots_connected: AtomicU64,
    pub disconnects_requested: AtomicU64,
    pub disconnects_completed: AtomicU64,
    pub network_failures: AtomicU64,

    // Grid
    pub regions_discovered: AtomicU64,

    // Login latency (milliseconds)
    pub login_time_p50_ms: AtomicU64,
    pub login_time_p95_ms: AtomicU64,
    pub login_time_max_ms: AtomicU64,

    start_time: Instant,

    // Rolling login times for percentile calculation
    login_history: RwLock<VecDeque<u64>>,
}

/// Point-in-time copy of every metric, for JSON rendering
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub bots_launched: u64,
    pub login_attempts: u64,
    pub logins_succeeded: u64,
    pub login_failures: u64,
    pub bots_connected: u64,
    pub disconnects_requested: u64,
    pub disconnects_completed: u64,
    pub network_failures: u64,
    pub regions_discovered: u64,
    pub login_time_p50_ms: u64,
    pub login_time_p95_ms: u64,
    pub login_time_max_ms: u64,
    pub uptime_seconds: u64,
}

impl FleetMetrics {
    pub fn new() -> Self {
        Self {
            bots_launched: AtomicU64::new(0),
            login_attempts: AtomicU64::new(0),
            logins_succeeded: AtomicU64::new(0),
            login_failures: AtomicU64::new(0),
            bots_connected: AtomicU64::new(0),
            disconnects_requested: AtomicU64::new(0),
            disconnects_completed: AtomicU64::new(0),
            network_failures: AtomicU64::new(0),
            regions_discovered: AtomicU64::new(0),
            login_time_p50_ms: AtomicU64::new(0),
            login_time_p95_ms: AtomicU64::new(0),
            login_time_max_ms: AtomicU64::new(0),
            start_time: Instant::now(),
            login_history: RwLock::new(VecDeque::with_capacity(LATENCY_HISTORY)),
        }
    }

    pub fn record_launch(&self) {
        self.bots_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login_attempt(&self) {
        self.login_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login_failure(&self) {
        self.login_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect_requests(&self, count: usize) {
        self.disconnects_requested
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_region_discovered(&self) {
        self.regions_discovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful login and update latency percentiles
    pub fn record_login_success(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bots_connected.fetch_add(1, Ordering::Relaxed);

        let mut history = self.login_history.write();
        history.push_back(ms);
        while history.len() > LATENCY_HISTORY {
            history.pop_front();
        }

        let mut sorted: Vec<u64> = history.iter().copied().collect();
        sorted.sort_unstable();
        let p50_idx = sorted.len() / 2;
        let p95_idx = (sorted.len() as f32 * 0.95) as usize;

        self.login_time_p50_ms
            .store(sorted[p50_idx.min(sorted.len() - 1)], Ordering::Relaxed);
        self.login_time_p95_ms
            .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
        self.login_time_max_ms
            .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
    }

    pub fn record_disconnect(&self, reason: &DisconnectReason) {
        // Saturating: a gauge must not wrap if events arrive out of order
        let _ = self
            .bots_connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
        self.disconnects_completed.fetch_add(1, Ordering::Relaxed);
        if matches!(reason, DisconnectReason::NetworkFailure(_)) {
            self.network_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bots_launched: self.bots_launched.load(Ordering::Relaxed),
            login_attempts: self.login_attempts.load(Ordering::Relaxed),
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            login_failures: self.login_failures.load(Ordering::Relaxed),
            bots_connected: self.bots_connected.load(Ordering::Relaxed),
            disconnects_requested: self.disconnects_requested.load(Ordering::Relaxed),
            disconnects_completed: self.disconnects_completed.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            regions_discovered: self.regions_discovered.load(Ordering::Relaxed),
            login_time_p50_ms: self.login_time_p50_ms.load(Ordering::Relaxed),
            login_time_p95_ms: self.login_time_p95_ms.load(Ordering::Relaxed),
            login_time_max_ms: self.login_time_max_ms.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("gridbot_bots_launched_total", "Bots launched", "counter", s.bots_launched);
        metric!("gridbot_login_attempts_total", "Login attempts", "counter", s.login_attempts);
        metric!("gridbot_logins_succeeded_total", "Successful logins", "counter", s.logins_succeeded);
        metric!("gridbot_login_failures_total", "Failed logins", "counter", s.login_failures);
        metric!("gridbot_bots_connected", "Bots currently connected", "gauge", s.bots_connected);
        metric!("gridbot_disconnects_requested_total", "Disconnects requested by the operator", "counter",
            s.disconnects_requested);
        metric!("gridbot_disconnects_total", "Completed disconnects", "counter", s.disconnects_completed);
        metric!("gridbot_network_failures_total", "Sessions lost to network faults", "counter",
            s.network_failures);
        metric!("gridbot_regions_discovered", "Distinct regions seen by the fleet", "gauge",
            s.regions_discovered);
        metric!("gridbot_login_time_p50_milliseconds", "Median login time", "gauge", s.login_time_p50_ms);
        metric!("gridbot_login_time_p95_milliseconds", "95th percentile login time", "gauge",
            s.login_time_p95_ms);
        metric!("gridbot_login_time_max_milliseconds", "Maximum login time", "gauge", s.login_time_max_ms);
        metric!("gridbot_uptime_seconds", "Fleet uptime in seconds", "counter", s.uptime_seconds);

        output
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics_server")]
pub use server::start_metrics_server;

#[cfg(feature = "metrics_server")]
mod server {
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tracing::{debug, info};

    use super::FleetMetrics;

    fn respond(request: &str, metrics: &FleetMetrics) -> String {
        let (content_type, body) = if request.starts_with("GET /metrics/json") {
            ("application/json", metrics.to_json())
        } else if request.starts_with("GET /metrics") {
            ("text/plain; version=0.0.4", metrics.to_prometheus())
        } else if request.starts_with("GET /health") {
            ("text/plain", "OK".to_string())
        } else {
            return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string();
        };

        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            content_type,
            body.len(),
            body
        )
    }

    /// Serve metrics until the listener fails
    pub async fn start_metrics_server(metrics: Arc<FleetMetrics>, port: u16) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        serve(listener, metrics).await
    }

    pub(super) async fn serve(listener: TcpListener, metrics: Arc<FleetMetrics>) -> anyhow::Result<()> {
        info!("Metrics server listening on http://{}/metrics", listener.local_addr()?);

        loop {
            let (mut socket, peer) = listener.accept().await?;
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let mut buffer = [0u8; 1024];
                match socket.read(&mut buffer).await {
                    Ok(n) if n > 0 => {
                        let request = String::from_utf8_lossy(&buffer[..n]);
                        let response = respond(&request, &metrics);
                        if let Err(e) = socket.write_all(response.as_bytes()).await {
                            debug!("Failed to write metrics response to {}: {}", peer, e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Failed to read from metrics socket {}: {}", peer, e),
                }
            });
        }
    }

}
