//! Scene-mutation executor.
//!
//! The executor lives on the host thread. It owns the [`EntityRegistry`] and
//! the [`SceneHost`], runs dispatched jobs against them, and turns host
//! notifications into [`SyncState`] updates.
//!
//! Batch operations resolve every id before touching the host, so an unknown
//! id leaves the scene untouched. A host failure midway through a batch is
//! not rolled back.

use std::sync::mpsc;

use crate::{
    DispatchQueue, DrainReport, EntityId, EntityRegistry, HostNotification, HostObserver,
    ObserverToken, Position, Rgba, SceneError, SceneHost, SceneResult, SpawnSpec, SyncState,
    VisualEntity,
};

/// Scale given to every spot until `set_sphere_size` is called.
pub const DEFAULT_SPHERE_SIZE: f32 = 0.1;

/// Parameters of a new entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AddEntityRequest {
    /// External id, unique among entities.
    pub id: EntityId,
    /// Display label.
    pub label: String,
    /// Initial position.
    pub position: Position,
    /// Initial color; derived from the id when absent.
    pub color: Option<Rgba>,
}

/// Applies mutations to the registry and the host.
pub struct SceneExecutor {
    registry: EntityRegistry,
    host: Box<dyn SceneHost>,
    sync: SyncState,
    sphere_size: f32,
    observer: Option<ObserverToken>,
    inbox: mpsc::Receiver<HostNotification>,
}

impl std::fmt::Debug for SceneExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneExecutor")
            .field("entities", &self.registry.len())
            .field("sphere_size", &self.sphere_size)
            .field("observing", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl SceneExecutor {
    /// Take ownership of `host` and register for its interaction callbacks.
    #[must_use]
    pub fn new(mut host: Box<dyn SceneHost>, sync: SyncState) -> Self {
        let (observer, inbox) = HostObserver::channel();
        let token = host.register_observer(observer);
        tracing::debug!(?token, "Host observer registered");
        Self {
            registry: EntityRegistry::new(),
            host,
            sync,
            sphere_size: DEFAULT_SPHERE_SIZE,
            observer: Some(token),
            inbox,
        }
    }

    /// Entities known to the executor.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// The host this executor drives.
    #[must_use]
    pub fn host(&self) -> &dyn SceneHost {
        self.host.as_ref()
    }

    /// State updated by host notifications.
    #[must_use]
    pub fn sync(&self) -> &SyncState {
        &self.sync
    }

    /// Current shared spot scale.
    #[must_use]
    pub fn sphere_size(&self) -> f32 {
        self.sphere_size
    }

    /// Create a new entity in the host and register it.
    ///
    /// # Errors
    ///
    /// [`SceneError::DuplicateId`] if the id is taken (the host is not
    /// called), or the host's error if it cannot create the object.
    pub fn add_entity(&mut self, request: AddEntityRequest) -> SceneResult<()> {
        let AddEntityRequest {
            id,
            label,
            position,
            color,
        } = request;
        if self.registry.contains(&id) {
            return Err(SceneError::DuplicateId(id));
        }

        let color = color.unwrap_or_else(|| Rgba::derived_from(&id));
        let handle = self.host.apply_entity_add(&SpawnSpec {
            label: label.clone(),
            position,
            color,
            scale: self.sphere_size,
        })?;
        tracing::debug!(%id, %handle, "Entity added");
        self.registry
            .insert(VisualEntity::new(id, handle, label, position, color))
    }

    /// Recolor `ids[i]` with `colors[i]`.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidArgument`] on a length mismatch and
    /// [`SceneError::NotFound`] for an unknown id, both before any change.
    pub fn set_colors(&mut self, ids: &[EntityId], colors: &[Rgba]) -> SceneResult<()> {
        if ids.len() != colors.len() {
            return Err(SceneError::InvalidArgument(format!(
                "{} ids but {} colors",
                ids.len(),
                colors.len()
            )));
        }
        let handles = self.registry.resolve_all(ids)?;

        for ((id, handle), color) in ids.iter().zip(handles).zip(colors) {
            self.host.apply_entity_recolor(handle, *color)?;
            self.registry.get_mut(id)?.color = *color;
        }
        Ok(())
    }

    /// Show and place the listed entities; hide every other one.
    ///
    /// `coordinates` holds `x, y, z` for each id in order.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidArgument`] unless there are three coordinates per
    /// id, [`SceneError::NotFound`] for an unknown id, both before any change.
    pub fn set_visibility_and_position(
        &mut self,
        ids: &[EntityId],
        coordinates: &[f32],
    ) -> SceneResult<()> {
        if ids.len().checked_mul(3) != Some(coordinates.len()) {
            return Err(SceneError::InvalidArgument(format!(
                "{} coordinates for {} ids, expected three per id",
                coordinates.len(),
                ids.len()
            )));
        }
        self.registry.resolve_all(ids)?;

        let mut placed = std::collections::HashMap::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            let position = Position::from_flat(coordinates, index).ok_or_else(|| {
                SceneError::InvalidArgument(format!("missing coordinates for {id}"))
            })?;
            placed.insert(id, position);
        }

        for entity in self.registry.iter_mut() {
            let target = placed.get(entity.id()).copied();
            if let Some(position) = target {
                self.host.apply_entity_reposition(entity.handle(), position)?;
                entity.position = position;
            }
            let visible = target.is_some();
            if entity.visible != visible {
                self.host.apply_visibility(entity.handle(), visible)?;
                entity.visible = visible;
            }
        }
        Ok(())
    }

    /// Highlight `id` in the host and record it as the active spot.
    /// `None` clears the highlight.
    ///
    /// # Errors
    ///
    /// [`SceneError::NotFound`] for an unknown id.
    pub fn set_active(&mut self, id: Option<EntityId>) -> SceneResult<()> {
        let handle = id
            .as_ref()
            .map(|id| self.registry.get(id).map(VisualEntity::handle))
            .transpose()?;
        self.host.apply_highlight(handle)?;
        self.sync.set_active_entity(id);
        Ok(())
    }

    /// Select exactly the listed entities in the host.
    ///
    /// # Errors
    ///
    /// [`SceneError::NotFound`] for an unknown id.
    pub fn set_selection(&mut self, ids: &[EntityId]) -> SceneResult<()> {
        let handles = self.registry.resolve_all(ids)?;
        self.host.apply_selection(&handles)?;
        Ok(())
    }

    /// Move the host timeline.
    ///
    /// # Errors
    ///
    /// Returns the host's error if it cannot seek.
    pub fn set_time_point(&mut self, frame: i64) -> SceneResult<()> {
        self.host.apply_seek_timeline(frame)?;
        Ok(())
    }

    /// Change the scale shared by all spots and apply it to each.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidArgument`] unless `size` is finite and positive.
    pub fn set_sphere_size(&mut self, size: f32) -> SceneResult<()> {
        if !(size.is_finite() && size > 0.0) {
            return Err(SceneError::InvalidArgument(format!(
                "sphere size must be positive, got {size}"
            )));
        }
        self.sphere_size = size;
        for entity in self.registry.iter() {
            self.host.apply_entity_scale(entity.handle(), size)?;
        }
        Ok(())
    }

    /// Ask the host to close the viewer.
    pub fn close(&mut self) {
        tracing::info!(entities = self.registry.len(), "Closing viewer");
        self.host.close();
    }

    /// One host-thread cycle: run queued jobs, then react to interaction.
    pub fn tick(&mut self, queue: &DispatchQueue<Self>) -> DrainReport {
        let report = queue.drain(self);
        self.process_notifications();
        report
    }

    /// Handle every queued host notification. Returns how many were handled.
    pub fn process_notifications(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notification) = self.inbox.try_recv() {
            self.handle_notification(notification);
            handled += 1;
        }
        handled
    }

    /// Unregister from the host. Later notifications are not delivered.
    pub fn shutdown(&mut self) {
        if let Some(token) = self.observer.take() {
            self.host.unregister_observer(token);
            tracing::debug!(?token, "Host observer unregistered");
        }
    }

    fn handle_notification(&mut self, notification: HostNotification) {
        match notification {
            HostNotification::ActiveObjectChanged => {
                let active = self
                    .host
                    .active_object()
                    .and_then(|handle| self.registry.id_for_handle(handle).ok())
                    .cloned();
                self.sync.set_active_entity(active);
            }
            HostNotification::FrameChanged(frame) => {
                self.sync.set_time_point(frame);
            }
            HostNotification::TagSetSelected(index) => {
                self.sync.set_tag_set_index(index);
            }
            HostNotification::SyncGroupSelected(index) => {
                self.sync.set_sync_group_index(index);
            }
            HostNotification::ColorRefreshRequested => self.sync.request_color_refresh(),
        }
    }
}

impl Drop for SceneExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
