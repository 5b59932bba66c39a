//! The viewer host, seen from the synchronization core.
//!
//! Rendering, scene-graph construction and the GUI belong to the host. The
//! core only needs the small "apply to scene" surface in [`SceneHost`] and a
//! way to hear about user interaction, which is the [`HostObserver`] the core
//! registers with the host.

use std::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::{HostError, Position, Rgba};

/// Opaque handle of a host-native scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneHandle(u64);

impl SceneHandle {
    /// Wrap a host-native object key.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The host-native key.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the host needs to create the object for a new entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    /// Object name shown in the viewer.
    pub label: String,
    /// Initial position.
    pub position: Position,
    /// Initial color.
    pub color: Rgba,
    /// Uniform scale shared by all spots.
    pub scale: f32,
}

/// Token returned by [`SceneHost::register_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub u64);

/// Interaction reported by the host.
///
/// Notifications carry only what the host knows cheaply; the executor
/// re-reads anything else (e.g. the active object) when it handles them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostNotification {
    /// The active object changed in the viewer.
    ActiveObjectChanged,
    /// The viewer timeline moved to a new frame.
    FrameChanged(i64),
    /// A tag set was chosen in the viewer panel (-1 = none).
    TagSetSelected(i32),
    /// A sync group was chosen in the viewer panel (-1 = none).
    SyncGroupSelected(i32),
    /// The user asked for spot colors to be refreshed.
    ColorRefreshRequested,
}

/// Callback endpoint the core registers with the host.
///
/// The host invokes these from its own thread. Each call queues a
/// [`HostNotification`] that the executor handles on its next tick, so no
/// callback ever touches core state directly.
#[derive(Debug, Clone)]
pub struct HostObserver {
    tx: mpsc::Sender<HostNotification>,
}

impl HostObserver {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<HostNotification>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// The viewer's active object changed.
    pub fn on_active_object_changed(&self) {
        self.notify(HostNotification::ActiveObjectChanged);
    }

    /// The viewer's timeline moved to `frame`.
    pub fn on_frame_changed(&self, frame: i64) {
        self.notify(HostNotification::FrameChanged(frame));
    }

    /// A tag set was chosen in the viewer.
    pub fn on_tag_set_selected(&self, index: i32) {
        self.notify(HostNotification::TagSetSelected(index));
    }

    /// A sync group was chosen in the viewer.
    pub fn on_sync_group_selected(&self, index: i32) {
        self.notify(HostNotification::SyncGroupSelected(index));
    }

    /// The user pressed "update colors".
    pub fn on_colors_refresh_requested(&self) {
        self.notify(HostNotification::ColorRefreshRequested);
    }

    /// Queue a notification for the executor.
    pub fn notify(&self, notification: HostNotification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!(?notification, "Executor gone, dropping host notification");
        }
    }
}

/// The viewer, as far as the synchronization core is concerned.
///
/// Implementations live on the host thread and are never shared across
/// threads, so the trait has no `Send`/`Sync` bound.
pub trait SceneHost {
    /// Create the scene object for a new entity.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if the host cannot create the object.
    fn apply_entity_add(&mut self, spec: &SpawnSpec) -> Result<SceneHandle, HostError>;

    /// Change an object's color.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHandle`] for a handle the host does not know.
    fn apply_entity_recolor(&mut self, handle: SceneHandle, color: Rgba) -> Result<(), HostError>;

    /// Move an object.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHandle`] for a handle the host does not know.
    fn apply_entity_reposition(
        &mut self,
        handle: SceneHandle,
        position: Position,
    ) -> Result<(), HostError>;

    /// Show or hide an object.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHandle`] for a handle the host does not know.
    fn apply_visibility(&mut self, handle: SceneHandle, visible: bool) -> Result<(), HostError>;

    /// Set an object's uniform scale.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHandle`] for a handle the host does not know.
    fn apply_entity_scale(&mut self, handle: SceneHandle, scale: f32) -> Result<(), HostError>;

    /// Move the viewer timeline to `frame`.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if the timeline cannot be moved.
    fn apply_seek_timeline(&mut self, frame: i64) -> Result<(), HostError>;

    /// Make `handle` the active object, clearing any previous highlight.
    /// `None` clears the highlight.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHandle`] for a handle the host does not know.
    fn apply_highlight(&mut self, handle: Option<SceneHandle>) -> Result<(), HostError>;

    /// Select exactly `handles`, deselecting everything else.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHandle`] if any handle is unknown.
    fn apply_selection(&mut self, handles: &[SceneHandle]) -> Result<(), HostError>;

    /// The viewer's current active object, if any.
    fn active_object(&self) -> Option<SceneHandle>;

    /// Register the core's interaction observer.
    fn register_observer(&mut self, observer: HostObserver) -> ObserverToken;

    /// Drop a previously registered observer.
    fn unregister_observer(&mut self, token: ObserverToken);

    /// Ask the viewer to close.
    fn close(&mut self) {}
}
