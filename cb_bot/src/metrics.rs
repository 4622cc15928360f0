//! Prometheus metrics for monitoring the bot.
//!
//! The library records its own counters through the `metrics` facade
//! (`blackjack_updates_total`, `blackjack_updates_ignored_total`,
//! `blackjack_dispatch_errors_total`, `blackjack_rounds_settled_total`,
//! `blackjack_payout_units_total`). This module installs the exporter and
//! records the transport and admin side.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// Transport Metrics
// ============================================================================

/// Record updates fetched by one long poll.
pub fn updates_polled(count: usize) {
    metrics::counter!("telegram_updates_polled_total").increment(count as u64);
}

/// Increment failed long polls counter.
pub fn poll_failures_total() {
    metrics::counter!("telegram_poll_failures_total").increment(1);
}

/// Increment outbound messages counter.
pub fn messages_sent_total(success: bool) {
    metrics::counter!("telegram_messages_sent_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Set current update queue backlog.
pub fn queue_backlog(pending: usize) {
    metrics::gauge!("blackjack_update_queue_backlog").set(pending as f64);
}

// ============================================================================
// Admin Metrics
// ============================================================================

/// Record admin HTTP request.
pub fn admin_requests_total(path: &str, status: u16) {
    metrics::counter!("admin_requests_total",
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
