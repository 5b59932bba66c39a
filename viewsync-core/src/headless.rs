//! In-memory [`SceneHost`] for running without a real viewer.
//!
//! The server binary uses it when no viewer is attached, and tests use its
//! [`HeadlessHandle`] to inspect the scene and to play the part of the user
//! (clicking spots, scrubbing the timeline, choosing tag sets).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    HostError, HostNotification, HostObserver, ObserverToken, Position, Rgba, SceneHandle,
    SceneHost, SpawnSpec,
};

/// One object in the headless scene.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessObject {
    /// Object name.
    pub label: String,
    /// Current position.
    pub position: Position,
    /// Current color.
    pub color: Rgba,
    /// Uniform scale.
    pub scale: f32,
    /// Whether the object is shown.
    pub visible: bool,
}

#[derive(Debug, Default)]
struct HeadlessScene {
    objects: BTreeMap<SceneHandle, HeadlessObject>,
    next_handle: u64,
    active: Option<SceneHandle>,
    selected: BTreeSet<SceneHandle>,
    frame: i64,
    observers: HashMap<ObserverToken, HostObserver>,
    next_token: u64,
    failing: HashSet<SceneHandle>,
    closed: bool,
}

impl HeadlessScene {
    fn object_mut(&mut self, handle: SceneHandle) -> Result<&mut HeadlessObject, HostError> {
        if self.closed {
            return Err(HostError::Closed);
        }
        if self.failing.contains(&handle) {
            return Err(HostError::Other(format!("injected failure on {handle}")));
        }
        self.objects
            .get_mut(&handle)
            .ok_or(HostError::UnknownHandle(handle))
    }

    fn notify(&self, notification: HostNotification) {
        for observer in self.observers.values() {
            observer.notify(notification);
        }
    }
}

/// Headless viewer. Create it, keep a [`handle`](Self::handle), then hand
/// the host itself to the executor.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    scene: Arc<Mutex<HeadlessScene>>,
}

impl HeadlessHost {
    /// Empty scene at frame 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspection and interaction handle sharing this scene.
    #[must_use]
    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle {
            scene: Arc::clone(&self.scene),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessScene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SceneHost for HeadlessHost {
    fn apply_entity_add(&mut self, spec: &SpawnSpec) -> Result<SceneHandle, HostError> {
        let mut scene = self.lock();
        if scene.closed {
            return Err(HostError::Closed);
        }
        scene.next_handle += 1;
        let handle = SceneHandle::new(scene.next_handle);
        scene.objects.insert(
            handle,
            HeadlessObject {
                label: spec.label.clone(),
                position: spec.position,
                color: spec.color,
                scale: spec.scale,
                visible: true,
            },
        );
        Ok(handle)
    }

    fn apply_entity_recolor(&mut self, handle: SceneHandle, color: Rgba) -> Result<(), HostError> {
        self.lock().object_mut(handle)?.color = color;
        Ok(())
    }

    fn apply_entity_reposition(
        &mut self,
        handle: SceneHandle,
        position: Position,
    ) -> Result<(), HostError> {
        self.lock().object_mut(handle)?.position = position;
        Ok(())
    }

    fn apply_visibility(&mut self, handle: SceneHandle, visible: bool) -> Result<(), HostError> {
        self.lock().object_mut(handle)?.visible = visible;
        Ok(())
    }

    fn apply_entity_scale(&mut self, handle: SceneHandle, scale: f32) -> Result<(), HostError> {
        self.lock().object_mut(handle)?.scale = scale;
        Ok(())
    }

    fn apply_seek_timeline(&mut self, frame: i64) -> Result<(), HostError> {
        let mut scene = self.lock();
        if scene.closed {
            return Err(HostError::Closed);
        }
        if scene.frame != frame {
            scene.frame = frame;
            // Timeline handlers fire for programmatic seeks too.
            scene.notify(HostNotification::FrameChanged(frame));
        }
        Ok(())
    }

    fn apply_highlight(&mut self, handle: Option<SceneHandle>) -> Result<(), HostError> {
        let mut scene = self.lock();
        if let Some(handle) = handle {
            scene.object_mut(handle)?;
        }
        scene.active = handle;
        scene.selected = handle.into_iter().collect();
        Ok(())
    }

    fn apply_selection(&mut self, handles: &[SceneHandle]) -> Result<(), HostError> {
        let mut scene = self.lock();
        for handle in handles {
            scene.object_mut(*handle)?;
        }
        scene.selected = handles.iter().copied().collect();
        Ok(())
    }

    fn active_object(&self) -> Option<SceneHandle> {
        self.lock().active
    }

    fn register_observer(&mut self, observer: HostObserver) -> ObserverToken {
        let mut scene = self.lock();
        scene.next_token += 1;
        let token = ObserverToken(scene.next_token);
        scene.observers.insert(token, observer);
        token
    }

    fn unregister_observer(&mut self, token: ObserverToken) {
        self.lock().observers.remove(&token);
    }

    fn close(&mut self) {
        let mut scene = self.lock();
        scene.closed = true;
        tracing::info!(objects = scene.objects.len(), "Headless viewer closed");
    }
}

/// Shared view of a [`HeadlessHost`] scene.
#[derive(Debug, Clone)]
pub struct HeadlessHandle {
    scene: Arc<Mutex<HeadlessScene>>,
}

impl HeadlessHandle {
    /// Object behind `handle`.
    #[must_use]
    pub fn object(&self, handle: SceneHandle) -> Option<HeadlessObject> {
        self.lock().objects.get(&handle).cloned()
    }

    /// Handle of the first object named `label`.
    #[must_use]
    pub fn find(&self, label: &str) -> Option<SceneHandle> {
        self.lock()
            .objects
            .iter()
            .find(|(_, object)| object.label == label)
            .map(|(handle, _)| *handle)
    }

    /// Object named `label`.
    #[must_use]
    pub fn object_named(&self, label: &str) -> Option<HeadlessObject> {
        self.find(label).and_then(|handle| self.object(handle))
    }

    /// Number of objects in the scene.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Active object.
    #[must_use]
    pub fn active(&self) -> Option<SceneHandle> {
        self.lock().active
    }

    /// Selected objects, ordered by handle.
    #[must_use]
    pub fn selection(&self) -> Vec<SceneHandle> {
        self.lock().selected.iter().copied().collect()
    }

    /// Current timeline frame.
    #[must_use]
    pub fn frame(&self) -> i64 {
        self.lock().frame
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Whether the viewer was asked to close.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Make every later call touching `handle` fail.
    pub fn fail_on(&self, handle: SceneHandle) {
        self.lock().failing.insert(handle);
    }

    /// User clicks an object (or empty space with `None`).
    pub fn click(&self, handle: Option<SceneHandle>) {
        let mut scene = self.lock();
        scene.active = handle;
        scene.selected = handle.into_iter().collect();
        scene.notify(HostNotification::ActiveObjectChanged);
    }

    /// User drags the timeline to `frame`.
    pub fn scrub_to(&self, frame: i64) {
        let mut scene = self.lock();
        scene.frame = frame;
        scene.notify(HostNotification::FrameChanged(frame));
    }

    /// User picks a tag set in the panel.
    pub fn choose_tag_set(&self, index: i32) {
        self.lock().notify(HostNotification::TagSetSelected(index));
    }

    /// User picks a sync group in the panel.
    pub fn choose_sync_group(&self, index: i32) {
        self.lock().notify(HostNotification::SyncGroupSelected(index));
    }

    /// User presses "update colors".
    pub fn press_update_colors(&self) {
        self.lock().notify(HostNotification::ColorRefreshRequested);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessScene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
