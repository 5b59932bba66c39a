//! Errors returned to RPC callers.

use thiserror::Error;
use viewsync_core::SceneError;

use crate::validation::ValidationError;

/// Result type for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Why a service call was refused.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The core refused the request.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// JSON-RPC error codes used by this server.
pub mod codes {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Not a valid JSON-RPC request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Bad parameters, including failed validation.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Host-side failure.
    pub const HOST_ERROR: i32 = -32000;
    /// The server is shutting down.
    pub const UNAVAILABLE: i32 = -32003;
    /// Unknown entity.
    pub const NOT_FOUND: i32 = -32004;
    /// Entity id or handle already in use.
    pub const DUPLICATE_ID: i32 = -32009;
}

impl ServiceError {
    /// JSON-RPC error code for this error.
    #[must_use]
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Scene(SceneError::InvalidArgument(_)) => {
                codes::INVALID_PARAMS
            }
            Self::Scene(SceneError::NotFound(_)) => codes::NOT_FOUND,
            Self::Scene(SceneError::DuplicateId(_) | SceneError::DuplicateHandle { .. }) => {
                codes::DUPLICATE_ID
            }
            Self::Scene(SceneError::Unavailable(_)) => codes::UNAVAILABLE,
            Self::Scene(SceneError::Host(_)) => codes::HOST_ERROR,
        }
    }
}
