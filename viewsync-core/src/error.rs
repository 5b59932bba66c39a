//! Error types for scene synchronization.

use thiserror::Error;

use crate::{EntityId, SceneHandle};

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors raised by the registry, the executor and the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// No entity is registered under this id (or handle).
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// An entity with this id already exists.
    #[error("Duplicate entity id: {0}")]
    DuplicateId(EntityId),

    /// The host handle is already mapped to another entity.
    #[error("Scene handle {handle} already belongs to entity {existing}")]
    DuplicateHandle {
        /// The handle that was reused.
        handle: SceneHandle,
        /// The entity currently owning the handle.
        existing: EntityId,
    },

    /// Malformed request (mismatched batch lengths, non-finite values).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The dispatch queue no longer accepts work.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The host refused or failed a scene call.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl SceneError {
    /// Build a [`SceneError::NotFound`] for an entity id.
    #[must_use]
    pub fn entity_not_found(id: &EntityId) -> Self {
        Self::NotFound(id.to_string())
    }
}

/// Failures reported by a [`crate::SceneHost`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host has no object for this handle.
    #[error("Unknown scene handle: {0}")]
    UnknownHandle(SceneHandle),

    /// The host is closed or closing.
    #[error("Host closed")]
    Closed,

    /// Any other host-side failure.
    #[error("Host error: {0}")]
    Other(String),
}
