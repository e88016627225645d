//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    describe_counter!("relayconn_dials_total", "Foreign relay dials started");
    describe_counter!("relayconn_dials_failed", "Foreign relay dials that failed");
    describe_gauge!("relayconn_foreign_connections", "Foreign relay entries currently registered");
    describe_counter!("relayconn_streams_opened", "Logical streams opened");
    describe_counter!("relayconn_streams_failed", "Logical stream opens that failed");
    describe_counter!("relayconn_reconnect_attempts", "Home relay reconnect attempts");
    describe_counter!("relayconn_reconnects_succeeded", "Home relay reconnects that succeeded");

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    tokio::spawn(sync_metrics_task());

    Ok(())
}

/// Background task that periodically syncs our atomic counters to the metrics crate
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut last = MetricsSnapshot::default();

    loop {
        interval.tick().await;
        let now = METRICS.snapshot();

        push_delta("relayconn_dials_total", now.dials_total, last.dials_total);
        push_delta("relayconn_dials_failed", now.dials_failed, last.dials_failed);
        push_delta("relayconn_streams_opened", now.streams_opened, last.streams_opened);
        push_delta("relayconn_streams_failed", now.streams_failed, last.streams_failed);
        push_delta(
            "relayconn_reconnect_attempts",
            now.reconnect_attempts,
            last.reconnect_attempts,
        );
        push_delta(
            "relayconn_reconnects_succeeded",
            now.reconnects_succeeded,
            last.reconnects_succeeded,
        );
        gauge!("relayconn_foreign_connections").set(now.foreign_active() as f64);

        last = now;
    }
}

fn push_delta(name: &'static str, now: u64, before: u64) {
    let delta = now.saturating_sub(before);
    if delta > 0 {
        counter!(name).increment(delta);
    }
}
