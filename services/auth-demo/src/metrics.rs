//! Prometheus metrics exposition
//!
//! - `auth_demo_logins_total` (counter): label `result`
//! - `auth_demo_callbacks_total` (counter): label `outcome`
//! - `auth_demo_resource_calls_total` (counter): label `status`
//! - `auth_demo_resource_duration_seconds` (histogram)

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const RESOURCE_DURATION: &str = "auth_demo_resource_duration_seconds";

/// One round trip to the resource API, bounded above by the 30s default timeout.
const DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(RESOURCE_DURATION.to_string()), DURATION_BUCKETS)
}

/// Install the global recorder and return the handle `/metrics` renders from.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Handle backed by a recorder that is not installed globally.
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    builder().unwrap().build_recorder().handle()
}

pub fn record_login(result: &'static str) {
    metrics::counter!("auth_demo_logins_total", "result" => result).increment(1);
}

pub fn record_callback(outcome: &'static str) {
    metrics::counter!("auth_demo_callbacks_total", "outcome" => outcome).increment(1);
}

pub fn record_resource_call(status: u16, duration_secs: f64) {
    metrics::counter!("auth_demo_resource_calls_total", "status" => status.to_string())
        .increment(1);
    metrics::histogram!(RESOURCE_DURATION).record(duration_secs);
}
