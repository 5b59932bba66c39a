//! Health check endpoints for process supervisors.
//!
//! - `/health/live` - Liveness probe (restart if fails)
//! - `/health/ready` - Readiness probe (stop routing if fails)
//! - `/health` - Same as readiness

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: &'static str,
    /// Server version
    pub version: &'static str,
    /// Individual component checks
    pub checks: HealthChecks,
    /// Jobs waiting for the host thread
    pub queue_depth: usize,
    /// Open change-stream subscriptions
    pub subscribers: usize,
}

/// Individual health checks.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Dispatch queue accepts new jobs
    pub dispatch_queue: bool,
    /// Host thread is running its tick loop
    pub host_thread: bool,
}

/// Liveness probe - is the server running?
#[tracing::instrument(name = "liveness_probe")]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe - can the server apply mutations?
#[tracing::instrument(name = "readiness_probe", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let queue_ok = state.service.is_accepting();
    let host_ok = state.host.is_running();
    let all_ok = queue_ok && host_ok;

    let status = HealthStatus {
        status: if all_ok { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            dispatch_queue: queue_ok,
            host_thread: host_ok,
        },
        queue_depth: state.service.queue_depth(),
        subscribers: state.service.sync().bus().subscriber_count(),
    };

    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(status))
}
