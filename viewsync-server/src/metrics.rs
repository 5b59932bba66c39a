//! Prometheus metrics for viewsync-server.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use viewsync_core::{ChangeBus, DrainReport, Poll};

const RPC_CALLS_TOTAL: &str = "viewsync_rpc_calls_total";
const DISPATCH_JOBS_TOTAL: &str = "viewsync_dispatch_jobs_total";
const DISPATCH_QUEUE_DEPTH: &str = "viewsync_dispatch_queue_depth";
const CHANGE_EVENTS_TOTAL: &str = "viewsync_change_events_total";
const STREAM_SUBSCRIBERS_ACTIVE: &str = "viewsync_stream_subscribers_active";
const VALIDATION_FAILURES_TOTAL: &str = "viewsync_validation_failures_total";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a unary RPC call.
///
/// # Arguments
///
/// * `method` - RPC method name, or `"unknown"` when it did not parse
/// * `success` - Whether the call returned a result
pub fn record_rpc_call(method: &str, success: bool) {
    counter!(
        RPC_CALLS_TOTAL,
        "method" => method.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record the outcome of one host-thread drain.
pub fn record_drain(report: &DrainReport) {
    if report.executed > 0 {
        counter!(DISPATCH_JOBS_TOTAL, "outcome" => "executed").increment(report.executed as u64);
    }
    if report.failed > 0 {
        counter!(DISPATCH_JOBS_TOTAL, "outcome" => "failed").increment(report.failed as u64);
    }
}

/// Update the number of queued jobs.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    gauge!(DISPATCH_QUEUE_DEPTH).set(depth as f64);
}

/// Record a published change event.
pub fn record_change_event(kind: &'static str) {
    counter!(CHANGE_EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Increment active change-stream subscribers.
pub fn inc_stream_subscribers() {
    gauge!(STREAM_SUBSCRIBERS_ACTIVE).increment(1.0);
}

/// Decrement active change-stream subscribers.
pub fn dec_stream_subscribers() {
    gauge!(STREAM_SUBSCRIBERS_ACTIVE).decrement(1.0);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `validation_type` - Which check failed (entity_id, label, batch, coordinates, ...)
pub fn record_validation_failure(validation_type: &'static str) {
    counter!(VALIDATION_FAILURES_TOTAL, "type" => validation_type).increment(1);
}

/// Count every event published on `bus` until it closes.
pub fn spawn_event_counter(bus: &ChangeBus) -> tokio::task::JoinHandle<()> {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match subscription
                .recv_timeout(std::time::Duration::from_secs(60))
                .await
            {
                Poll::Event(event) => record_change_event(event.as_str()),
                Poll::Timeout => {}
                Poll::Closed => break,
            }
        }
        tracing::debug!("Change event counter stopped");
    })
}
