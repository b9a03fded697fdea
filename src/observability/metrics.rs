//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mgmt_endpoint_starts_total` (counter): start attempts by outcome
//! - `mgmt_endpoint_stops_total` (counter): completed stops
//! - `mgmt_endpoint_upgrades_total` (counter): HTTP upgrades by protocol
//! - `mgmt_endpoint_started` (gauge): 1=started, 0=stopped

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_start(outcome: &'static str) {
    counter!("mgmt_endpoint_starts_total", "outcome" => outcome).increment(1);
    if outcome == "success" {
        gauge!("mgmt_endpoint_started").set(1.0);
    }
}

pub fn record_stop() {
    counter!("mgmt_endpoint_stops_total").increment(1);
    gauge!("mgmt_endpoint_started").set(0.0);
}

pub fn record_upgrade(protocol: &str) {
    counter!("mgmt_endpoint_upgrades_total", "protocol" => protocol.to_string()).increment(1);
}
