//! Bidirectional mapping between external entity ids and host scene handles.
//!
//! The registry is owned by the executor and only ever touched on the host
//! thread, so it carries no locks. Both directions are updated by the same
//! private helpers; there is no public way to edit one side alone.

use std::collections::HashMap;

use crate::{EntityId, SceneError, SceneHandle, SceneResult, VisualEntity};

/// Entities by id, plus the reverse handle index.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    by_id: HashMap<EntityId, VisualEntity>,
    by_handle: HashMap<SceneHandle, EntityId>,
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::DuplicateId`] if the id is already registered and
    /// [`SceneError::DuplicateHandle`] if another entity owns the handle.
    pub fn insert(&mut self, entity: VisualEntity) -> SceneResult<()> {
        if self.by_id.contains_key(entity.id()) {
            return Err(SceneError::DuplicateId(entity.id().clone()));
        }
        if let Some(existing) = self.by_handle.get(&entity.handle()) {
            return Err(SceneError::DuplicateHandle {
                handle: entity.handle(),
                existing: existing.clone(),
            });
        }
        self.link(entity);
        Ok(())
    }

    /// Remove an entity, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotFound`] if the id is not registered.
    pub fn remove(&mut self, id: &EntityId) -> SceneResult<VisualEntity> {
        self.unlink(id)
            .ok_or_else(|| SceneError::entity_not_found(id))
    }

    /// Look up an entity by id.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotFound`] if the id is not registered.
    pub fn get(&self, id: &EntityId) -> SceneResult<&VisualEntity> {
        self.by_id
            .get(id)
            .ok_or_else(|| SceneError::entity_not_found(id))
    }

    /// Look up an entity by id for mutation. The handle stays read-only.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotFound`] if the id is not registered.
    pub fn get_mut(&mut self, id: &EntityId) -> SceneResult<&mut VisualEntity> {
        self.by_id
            .get_mut(id)
            .ok_or_else(|| SceneError::entity_not_found(id))
    }

    /// Resolve a host handle back to its entity id.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotFound`] if no entity owns the handle.
    pub fn id_for_handle(&self, handle: SceneHandle) -> SceneResult<&EntityId> {
        self.by_handle
            .get(&handle)
            .ok_or_else(|| SceneError::NotFound(format!("scene handle {handle}")))
    }

    /// Resolve every id to its handle, failing on the first unknown id.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotFound`] naming the first unknown id.
    pub fn resolve_all(&self, ids: &[EntityId]) -> SceneResult<Vec<SceneHandle>> {
        ids.iter()
            .map(|id| self.get(id).map(VisualEntity::handle))
            .collect()
    }

    /// Whether an id is registered.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all entities in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &VisualEntity> {
        self.by_id.values()
    }

    /// Iterate mutably over all entities in arbitrary order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VisualEntity> {
        self.by_id.values_mut()
    }

    fn link(&mut self, entity: VisualEntity) {
        self.by_handle.insert(entity.handle(), entity.id().clone());
        self.by_id.insert(entity.id().clone(), entity);
    }

    fn unlink(&mut self, id: &EntityId) -> Option<VisualEntity> {
        let entity = self.by_id.remove(id)?;
        self.by_handle.remove(&entity.handle());
        Some(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, Rgba};
    use proptest::prelude::*;

    fn entity(id: &str, handle: u64) -> VisualEntity {
        VisualEntity::new(
            EntityId::from(id),
            SceneHandle::new(handle),
            id,
            Position::default(),
            Rgba::WHITE,
        )
    }

    #[test]
    fn test_insert_and_lookup_both_directions() {
        let mut registry = EntityRegistry::new();
        registry.insert(entity("a", 1)).expect("insert should succeed");

        let a = registry.get(&EntityId::from("a")).expect("a should exist");
        assert_eq!(a.handle(), SceneHandle::new(1));
        assert_eq!(
            registry.id_for_handle(SceneHandle::new(1)).expect("handle should resolve"),
            &EntityId::from("a")
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = EntityRegistry::new();
        registry.insert(entity("a", 1)).expect("insert should succeed");

        let err = registry.insert(entity("a", 2)).unwrap_err();
        assert_eq!(err, SceneError::DuplicateId(EntityId::from("a")));
        // The failed insert must not leave a dangling reverse entry.
        assert!(registry.id_for_handle(SceneHandle::new(2)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let mut registry = EntityRegistry::new();
        registry.insert(entity("a", 1)).expect("insert should succeed");

        let err = registry.insert(entity("b", 1)).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateHandle { existing, .. } if existing.as_str() == "a"));
        assert!(!registry.contains(&EntityId::from("b")));
    }

    #[test]
    fn test_remove_clears_both_directions() {
        let mut registry = EntityRegistry::new();
        registry.insert(entity("a", 1)).expect("insert should succeed");

        let removed = registry.remove(&EntityId::from("a")).expect("remove should succeed");
        assert_eq!(removed.handle(), SceneHandle::new(1));
        assert!(registry.is_empty());
        assert!(registry.id_for_handle(SceneHandle::new(1)).is_err());
        assert!(matches!(
            registry.remove(&EntityId::from("a")),
            Err(SceneError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_all_reports_first_missing() {
        let mut registry = EntityRegistry::new();
        registry.insert(entity("a", 1)).expect("insert should succeed");

        let ids = [EntityId::from("a"), EntityId::from("b"), EntityId::from("c")];
        assert_eq!(
            registry.resolve_all(&ids).unwrap_err(),
            SceneError::NotFound("b".to_string())
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8, u8),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16, 0u8..16).prop_map(|(id, handle)| Op::Insert(id, handle)),
            (0u8..16).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_lookups_stay_consistent(ops in proptest::collection::vec(op(), 0..64)) {
            let mut registry = EntityRegistry::new();
            for op in ops {
                match op {
                    Op::Insert(id, handle) => {
                        let _ = registry.insert(entity(&id.to_string(), u64::from(handle)));
                    }
                    Op::Remove(id) => {
                        let _ = registry.remove(&EntityId::from(id.to_string()));
                    }
                }

                prop_assert_eq!(registry.by_id.len(), registry.by_handle.len());
                for entity in registry.iter() {
                    let back = registry.id_for_handle(entity.handle()).expect("handle must resolve");
                    prop_assert_eq!(back, entity.id());
                }
            }
        }
    }
}
