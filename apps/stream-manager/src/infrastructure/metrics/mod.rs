//! Prometheus Metrics Module
//!
//! Exposes manager metrics in Prometheus format.
//!
//! # Metrics
//!
//! - **Subscriptions**: tracked keys per class
//! - **Backend**: RPC and RPC failure counts per command
//! - **Status**: connected providers, status updates, automatic reconnects
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::SubscriptionClass;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Repeated calls return the handle from the first successful call.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

const TRACKED_KEYS: &str = "stream_manager_tracked_keys";
const CONNECTED_PROVIDERS: &str = "stream_manager_connected_providers";
const RPC_TOTAL: &str = "stream_manager_rpc_total";
const RPC_FAILURES_TOTAL: &str = "stream_manager_rpc_failures_total";
const STATUS_UPDATES_TOTAL: &str = "stream_manager_status_updates_total";
const RECONNECTS_TOTAL: &str = "stream_manager_reconnects_total";

fn register_metrics() {
    describe_gauge!(TRACKED_KEYS, "Distinct subscription keys tracked per class");
    describe_gauge!(CONNECTED_PROVIDERS, "Providers reported as connected");

    describe_counter!(RPC_TOTAL, "Backend calls issued by command");
    describe_counter!(RPC_FAILURES_TOTAL, "Backend calls that failed by command");

    describe_counter!(STATUS_UPDATES_TOTAL, "Non-empty status emissions applied");
    describe_counter!(RECONNECTS_TOTAL, "Automatic provider reconnect attempts");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Update the tracked key count for a class.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_keys(class: SubscriptionClass, count: usize) {
    gauge!(TRACKED_KEYS, "class" => class.as_str()).set(count as f64);
}

/// Update the connected provider count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connected_providers(count: usize) {
    gauge!(CONNECTED_PROVIDERS).set(count as f64);
}

/// Record a backend call.
pub fn record_rpc(command: &'static str) {
    counter!(RPC_TOTAL, "command" => command).increment(1);
}

/// Record a failed backend call.
pub fn record_rpc_failure(command: &'static str) {
    counter!(RPC_FAILURES_TOTAL, "command" => command).increment(1);
}

/// Record an applied status emission.
pub fn record_status_update() {
    counter!(STATUS_UPDATES_TOTAL).increment(1);
}

/// Record an automatic reconnect attempt.
pub fn record_reconnect(provider: &str) {
    counter!(RECONNECTS_TOTAL, "provider" => provider.to_string()).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
