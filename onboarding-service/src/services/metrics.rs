//! Prometheus exposition and domain counters.
//!
//! Counters go through the `metrics` facade; until `init_metrics` installs the
//! recorder they are no-ops, which keeps tests free of global state.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<(), anyhow::Error> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("Metrics recorder already initialized"))?;
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_account_created() {
    counter!("onboarding_accounts_created_total").increment(1);
}

/// `reason` is one of `already_exists`, `blacklisted`, `invalid_input`.
pub fn record_rejection(reason: &'static str) {
    counter!("onboarding_rejections_total", "reason" => reason).increment(1);
}

pub fn record_screening_fail_open() {
    counter!("screening_fail_open_total").increment(1);
}

pub fn record_event_published(outcome: &'static str) {
    counter!("events_published_total", "outcome" => outcome).increment(1);
}

/// `outcome` is one of `acked`, `requeued`, `dead_lettered`.
pub fn record_event_consumed(outcome: &'static str) {
    counter!("events_consumed_total", "outcome" => outcome).increment(1);
}

pub fn record_outbox_dispatched(outcome: &'static str) {
    counter!("outbox_dispatched_total", "outcome" => outcome).increment(1);
}
