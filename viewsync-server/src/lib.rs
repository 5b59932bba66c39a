//! # viewsync server library
//!
//! RPC surface, host thread runtime and ambient plumbing for the `viewsync`
//! binary. This library is used by both the binary and integration tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod health;
pub mod host_thread;
pub mod metrics;
pub mod routes;
pub mod rpc;
pub mod service;
pub mod shutdown;
pub mod stream;
pub mod validation;

pub use error::{ServiceError, ServiceResult};
pub use host_thread::{HostRuntime, HostStatus};
pub use service::ViewService;
pub use shutdown::Shutdown;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The view synchronization service.
    pub service: ViewService,
    /// Host thread liveness, for readiness checks.
    pub host: HostStatus,
}

impl AppState {
    /// Bundle a service with the status of the host thread feeding it.
    #[must_use]
    pub fn new(service: ViewService, host: HostStatus) -> Self {
        Self { service, host }
    }

    /// Get a reference to the service.
    #[must_use]
    pub fn service(&self) -> &ViewService {
        &self.service
    }
}
