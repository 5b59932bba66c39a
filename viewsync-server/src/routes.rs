//! Router assembly.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{health, rpc, stream, AppState};

/// RPC, stream and health routes. Layers and `/metrics` are added by the
/// binary.
#[must_use]
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/health", get(health::readiness))
        .route("/rpc", post(rpc::rpc_handler))
        .route("/rpc/subscribeToChanges", get(stream::subscribe_handler))
        .with_state(state)
}
