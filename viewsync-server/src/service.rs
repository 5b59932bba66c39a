//! The view synchronization service.
//!
//! Every mutating call validates its input on the calling task, queues a job
//! for the host thread and returns as soon as the job is accepted. Failures
//! inside the job are logged on the host thread and never reach the caller.
//! Reads come straight from [`SyncState`].

use viewsync_core::{
    AddEntityRequest, DispatchQueue, EntityId, Position, Rgba, SceneExecutor,
    SceneResult, Subscription, SyncState, VERSION,
};

use crate::error::ServiceResult;
use crate::metrics;
use crate::shutdown::Shutdown;
use crate::validation::{self, ValidationError};

/// Wire value the external tool sends for "no active entity".
pub const NULL_ENTITY_INDEX: u64 = 0xffff_ffff;

/// Handle shared by every RPC handler. Cloning shares the service.
#[derive(Debug, Clone)]
pub struct ViewService {
    queue: DispatchQueue<SceneExecutor>,
    sync: SyncState,
    shutdown: Shutdown,
}

impl ViewService {
    /// Service feeding `queue` and reading `sync`.
    #[must_use]
    pub fn new(queue: DispatchQueue<SceneExecutor>, sync: SyncState, shutdown: Shutdown) -> Self {
        Self {
            queue,
            sync,
            shutdown,
        }
    }

    /// Server version.
    #[must_use]
    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// Shared sync state.
    #[must_use]
    pub fn sync(&self) -> &SyncState {
        &self.sync
    }

    /// Shutdown signal.
    #[must_use]
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Whether new mutations are still accepted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Jobs waiting for the host thread.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Queue a new entity.
    ///
    /// # Errors
    ///
    /// Validation errors, or `Unavailable` once shutting down.
    pub fn add_entity(
        &self,
        id: EntityId,
        label: String,
        position: Position,
        color: Option<i64>,
    ) -> ServiceResult<()> {
        let color = checked(|| {
            validation::validate_entity_id(&id)?;
            validation::validate_label(&label)?;
            validation::validate_position(position.x, position.y, position.z)?;
            color.map(validation::validate_packed_color).transpose()
        })?;
        let request = AddEntityRequest {
            id,
            label,
            position,
            color: color.map(Rgba::from_packed_rgb),
        };
        self.submit("add_entity", move |executor| executor.add_entity(request))
    }

    /// Queue a recolor of `ids[i]` with wire color `colors[i]`.
    ///
    /// # Errors
    ///
    /// Validation errors, or `Unavailable` once shutting down.
    pub fn set_colors(&self, ids: Vec<EntityId>, colors: &[i64]) -> ServiceResult<()> {
        let colors = checked(|| {
            validation::validate_ids(&ids)?;
            validation::validate_colors(&ids, colors)
        })?;
        let colors: Vec<Rgba> = colors.into_iter().map(Rgba::from_packed_rgb).collect();
        self.submit("set_colors", move |executor| {
            executor.set_colors(&ids, &colors)
        })
    }

    /// Queue a show/place of `ids`, hiding everything else.
    ///
    /// # Errors
    ///
    /// Validation errors, or `Unavailable` once shutting down.
    pub fn set_visibility_and_position(
        &self,
        ids: Vec<EntityId>,
        coordinates: Vec<f32>,
    ) -> ServiceResult<()> {
        checked(|| {
            validation::validate_ids(&ids)?;
            validation::validate_coordinates(&ids, &coordinates)
        })?;
        self.submit("set_visibility_and_position", move |executor| {
            executor.set_visibility_and_position(&ids, &coordinates)
        })
    }

    /// Queue a multi-selection.
    ///
    /// # Errors
    ///
    /// Validation errors, or `Unavailable` once shutting down.
    pub fn set_selection(&self, ids: Vec<EntityId>) -> ServiceResult<()> {
        checked(|| validation::validate_ids(&ids))?;
        self.submit("set_selection", move |executor| executor.set_selection(&ids))
    }

    /// Queue a new shared spot size.
    ///
    /// # Errors
    ///
    /// Validation errors, or `Unavailable` once shutting down.
    pub fn set_sphere_size(&self, size: f32) -> ServiceResult<()> {
        checked(|| validation::validate_sphere_size(size))?;
        self.submit("set_sphere_size", move |executor| {
            executor.set_sphere_size(size)
        })
    }

    /// Queue the host seek, then record the new time point.
    ///
    /// The state is only updated once the seek is queued, so a refused call
    /// never publishes. Whichever of the two lands first publishes the change.
    ///
    /// # Errors
    ///
    /// `Unavailable` once shutting down; the state is not touched then.
    pub fn set_time_point(&self, frame: i64) -> ServiceResult<()> {
        self.submit("set_time_point", move |executor| {
            executor.set_time_point(frame)
        })?;
        self.sync.set_time_point(frame);
        Ok(())
    }

    /// Queue a change of the active entity. `None` and the null index clear it.
    ///
    /// # Errors
    ///
    /// Validation errors, or `Unavailable` once shutting down.
    pub fn set_active_entity(&self, id: Option<EntityId>) -> ServiceResult<()> {
        let null = EntityId::from(NULL_ENTITY_INDEX);
        let id = id.filter(|id| *id != null);
        if let Some(id) = &id {
            checked(|| validation::validate_entity_id(id))?;
        }
        self.submit("set_active_entity", move |executor| executor.set_active(id))
    }

    /// Current active entity.
    #[must_use]
    pub fn active_entity(&self) -> Option<EntityId> {
        self.sync.active_entity()
    }

    /// Current time point.
    #[must_use]
    pub fn time_point(&self) -> i64 {
        self.sync.time_point()
    }

    /// Replace the list of tag set names.
    ///
    /// # Errors
    ///
    /// Validation errors.
    pub fn set_tag_set_list(&self, names: Vec<String>) -> ServiceResult<()> {
        checked(|| validation::validate_tag_set_names(&names))?;
        self.sync.set_tag_set_list(names);
        Ok(())
    }

    /// Current tag set names.
    #[must_use]
    pub fn tag_set_list(&self) -> Vec<String> {
        self.sync.tag_set_list()
    }

    /// Selected tag set index, -1 for none.
    #[must_use]
    pub fn selected_tag_set(&self) -> i32 {
        self.sync.tag_set_index()
    }

    /// Selected sync group index, -1 for none.
    #[must_use]
    pub fn selected_sync_group(&self) -> i32 {
        self.sync.sync_group_index()
    }

    /// Ask the viewer to close, then start shutting the server down.
    ///
    /// # Errors
    ///
    /// `Unavailable` if shutdown already closed the queue.
    pub fn close_all(&self) -> ServiceResult<()> {
        self.submit("close_all", |executor| {
            executor.close();
            Ok(())
        })?;
        self.shutdown.trigger();
        Ok(())
    }

    /// Subscribe to change events from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.sync.subscribe()
    }

    /// Stop accepting mutations. Queued jobs still run on the host thread.
    pub fn begin_shutdown(&self) {
        self.queue.close();
    }

    fn submit<F>(&self, label: &'static str, job: F) -> ServiceResult<()>
    where
        F: FnOnce(&mut SceneExecutor) -> SceneResult<()> + Send + 'static,
    {
        self.queue.enqueue(label, job)?;
        tracing::trace!(job = label, depth = self.queue.len(), "Job queued");
        Ok(())
    }
}

fn checked<T>(check: impl FnOnce() -> Result<T, ValidationError>) -> ServiceResult<T> {
    check().map_err(|e| {
        metrics::record_validation_failure(e.kind());
        tracing::debug!(error = %e, "Rejected invalid request");
        e.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use viewsync_core::{ChangeEvent, HeadlessHandle, HeadlessHost, SceneError};

    struct Fixture {
        service: ViewService,
        queue: DispatchQueue<SceneExecutor>,
        executor: SceneExecutor,
        scene: HeadlessHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let sync = SyncState::new();
            let queue = DispatchQueue::new();
            let host = HeadlessHost::new();
            let scene = host.handle();
            let executor = SceneExecutor::new(Box::new(host), sync.clone());
            Self {
                service: ViewService::new(queue.clone(), sync, Shutdown::new()),
                queue,
                executor,
                scene,
            }
        }

        fn tick(&mut self) {
            self.executor.tick(&self.queue);
        }
    }

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    #[test]
    fn test_mutations_run_on_tick() {
        let mut fx = Fixture::new();
        fx.service
            .add_entity(id("a"), "spot a".into(), Position::new(1.0, 2.0, 3.0), Some(0xff0000))
            .expect("add should be accepted");
        assert_eq!(fx.scene.object_count(), 0);
        assert_eq!(fx.service.queue_depth(), 1);

        fx.tick();
        let object = fx.scene.object_named("spot a").expect("object should exist");
        assert_eq!(object.color, Rgba::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_set_active_then_read() {
        let mut fx = Fixture::new();
        fx.service
            .add_entity(id("a"), "a".into(), Position::default(), None)
            .expect("add should be accepted");
        fx.tick();
        assert_eq!(fx.service.active_entity(), None);

        fx.service
            .set_active_entity(Some(id("a")))
            .expect("set active should be accepted");
        fx.tick();
        assert_eq!(fx.service.active_entity(), Some(id("a")));

        fx.service
            .set_active_entity(Some(EntityId::from(NULL_ENTITY_INDEX)))
            .expect("null index should be accepted");
        fx.tick();
        assert_eq!(fx.service.active_entity(), None);
    }

    #[test]
    fn test_invalid_input_is_rejected_before_queueing() {
        let fx = Fixture::new();
        let err = fx.service.set_colors(vec![id("a"), id("b")], &[1]).unwrap_err();
        assert_eq!(err.rpc_code(), -32602);
        assert!(matches!(
            fx.service.set_sphere_size(0.0),
            Err(ServiceError::Validation(_))
        ));
        assert!(fx
            .service
            .set_visibility_and_position(vec![id("a")], vec![f32::NAN, 0.0, 0.0])
            .is_err());
        assert_eq!(fx.service.queue_depth(), 0);
    }

    #[test]
    fn test_set_time_point_updates_state_immediately() {
        let mut fx = Fixture::new();
        let mut sub = fx.service.subscribe();

        fx.service.set_time_point(12).expect("should be accepted");
        assert_eq!(fx.service.time_point(), 12);
        assert_eq!(sub.try_recv(), Some(ChangeEvent::TimePointChanged));

        fx.tick();
        assert_eq!(fx.scene.frame(), 12);
        // The host echoes the seek; the value is unchanged so nothing is published.
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_tag_set_list_round_trip() {
        let fx = Fixture::new();
        let names = vec!["lineage".to_string(), "fate".to_string()];
        fx.service
            .set_tag_set_list(names.clone())
            .expect("should be accepted");
        assert_eq!(fx.service.tag_set_list(), names);
        assert_eq!(fx.service.selected_tag_set(), -1);
        assert_eq!(fx.service.selected_sync_group(), -1);
    }

    #[test]
    fn test_close_all_closes_viewer_and_triggers_shutdown() {
        let mut fx = Fixture::new();
        fx.service.close_all().expect("close should be accepted");
        assert!(fx.service.shutdown().is_triggered());

        fx.tick();
        assert!(fx.scene.is_closed());
    }

    #[test]
    fn test_closed_queue_reports_unavailable() {
        let fx = Fixture::new();
        fx.service.begin_shutdown();
        assert!(!fx.service.is_accepting());

        let mut sub = fx.service.subscribe();
        let err = fx.service.set_time_point(3).unwrap_err();
        assert!(matches!(err, ServiceError::Scene(SceneError::Unavailable(_))));
        assert_eq!(fx.service.time_point(), 0);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_signed_argb_colors_are_accepted() {
        let mut fx = Fixture::new();
        // Opaque green, then opaque red, as signed 32-bit ARGB values.
        fx.service
            .add_entity(id("a"), "a".into(), Position::default(), Some(-16_711_936))
            .expect("add should be accepted");
        fx.tick();
        assert_eq!(
            fx.scene.object_named("a").map(|o| o.color),
            Some(Rgba::new(0.0, 1.0, 0.0, 1.0))
        );

        fx.service
            .set_colors(vec![id("a")], &[-65_536])
            .expect("recolor should be accepted");
        fx.tick();
        assert_eq!(
            fx.scene.object_named("a").map(|o| o.color),
            Some(Rgba::new(1.0, 0.0, 0.0, 1.0))
        );

        let err = fx
            .service
            .set_colors(vec![id("a")], &[1 << 33])
            .unwrap_err();
        assert_eq!(err.rpc_code(), -32602);
    }
}
