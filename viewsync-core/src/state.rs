//! Authoritative mirror of viewer-observable state.
//!
//! Every field has exactly one setter. Setters compare, store and publish
//! under the same write lock, so two racing writers can never both publish
//! for one transition and events leave in the order the values changed.
//! Writing the current value again is a no-op.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::{ChangeBus, ChangeEvent, EntityId, Subscription};

/// Index value meaning "nothing selected".
pub const NO_SELECTION: i32 = -1;

/// Point-in-time copy of the synchronized fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    /// Active spot, if any.
    pub active_entity: Option<EntityId>,
    /// Current timeline frame.
    pub time_point: i64,
    /// Selected tag set, or [`NO_SELECTION`].
    pub tag_set_index: i32,
    /// Selected sync group, or [`NO_SELECTION`].
    pub sync_group_index: i32,
    /// Names of the tag sets the external tool offers.
    pub tag_set_list: Vec<String>,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            active_entity: None,
            time_point: 0,
            tag_set_index: NO_SELECTION,
            sync_group_index: NO_SELECTION,
            tag_set_list: Vec::new(),
        }
    }
}

/// Shared sync state plus the bus its setters publish to.
///
/// Cloning shares the state.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    fields: Arc<RwLock<SyncSnapshot>>,
    bus: ChangeBus,
}

impl SyncState {
    /// Fresh state with its own bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state publishing to an existing bus.
    #[must_use]
    pub fn with_bus(bus: ChangeBus) -> Self {
        Self {
            fields: Arc::default(),
            bus,
        }
    }

    /// The bus setters publish to.
    #[must_use]
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Subscribe to changes from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Consistent copy of all fields.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current active spot.
    #[must_use]
    pub fn active_entity(&self) -> Option<EntityId> {
        self.read(|f| f.active_entity.clone())
    }

    /// Current time point.
    #[must_use]
    pub fn time_point(&self) -> i64 {
        self.read(|f| f.time_point)
    }

    /// Selected tag set index.
    #[must_use]
    pub fn tag_set_index(&self) -> i32 {
        self.read(|f| f.tag_set_index)
    }

    /// Selected sync group index.
    #[must_use]
    pub fn sync_group_index(&self) -> i32 {
        self.read(|f| f.sync_group_index)
    }

    /// Available tag set names.
    #[must_use]
    pub fn tag_set_list(&self) -> Vec<String> {
        self.read(|f| f.tag_set_list.clone())
    }

    /// Set the active spot. Returns whether the value changed.
    pub fn set_active_entity(&self, id: Option<EntityId>) -> bool {
        self.transition(ChangeEvent::ActiveSpotChanged, id, |f| &mut f.active_entity)
    }

    /// Set the current time point. Returns whether the value changed.
    pub fn set_time_point(&self, frame: i64) -> bool {
        self.transition(ChangeEvent::TimePointChanged, frame, |f| &mut f.time_point)
    }

    /// Select a tag set. Negative values mean none.
    pub fn set_tag_set_index(&self, index: i32) -> bool {
        self.transition(
            ChangeEvent::TagSetSelectionChanged,
            index.max(NO_SELECTION),
            |f| &mut f.tag_set_index,
        )
    }

    /// Select a sync group. Negative values mean none.
    pub fn set_sync_group_index(&self, index: i32) -> bool {
        self.transition(
            ChangeEvent::SyncGroupChanged,
            index.max(NO_SELECTION),
            |f| &mut f.sync_group_index,
        )
    }

    /// Replace the tag set list.
    ///
    /// A selection that no longer points into the list is reset to
    /// [`NO_SELECTION`], publishing its own event after the list event.
    pub fn set_tag_set_list(&self, names: Vec<String>) -> bool {
        let mut fields = self.write();
        if fields.tag_set_list == names {
            return false;
        }
        fields.tag_set_list = names;
        self.bus.publish(ChangeEvent::TagSetListUpdated);

        let out_of_range = usize::try_from(fields.tag_set_index)
            .is_ok_and(|i| i >= fields.tag_set_list.len());
        if out_of_range {
            fields.tag_set_index = NO_SELECTION;
            self.bus.publish(ChangeEvent::TagSetSelectionChanged);
        }
        true
    }

    /// Ask subscribers to resend colors. Always publishes.
    pub fn request_color_refresh(&self) {
        let _fields = self.write();
        self.bus.publish(ChangeEvent::ColorsNeedRefresh);
    }

    fn transition<T: PartialEq>(
        &self,
        event: ChangeEvent,
        value: T,
        field: impl FnOnce(&mut SyncSnapshot) -> &mut T,
    ) -> bool {
        let mut fields = self.write();
        let slot = field(&mut fields);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.bus.publish(event);
        true
    }

    fn read<T>(&self, f: impl FnOnce(&SyncSnapshot) -> T) -> T {
        f(&self.fields.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SyncSnapshot> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }
}
