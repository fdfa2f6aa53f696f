use crate::Entity;

/// Per-type lifecycle callbacks.
///
/// Attached to a [`TypeDescriptor`](crate::TypeDescriptor) and invoked by
/// [`Entity`] on lifecycle transitions. Hooks run after the entity's guard
/// has been released, so they may read the entity freely.
///
/// Most types do NOT need hooks. Only implement this if you need:
/// - Scheduling work when an object gains or loses authority
/// - Post-restore processing (e.g., rescheduling checks from restored state)
pub trait LifecycleHooks: Send + Sync {
    /// Called after `activate` (`true`) or `deactivate` (`false`).
    fn on_active_changed(&self, entity: &Entity, active: bool) {
        let _ = (entity, active);
    }

    /// Called when the object loses authority.
    fn on_pause(&self, entity: &Entity) {
        let _ = entity;
    }

    /// Called when the object gains authority.
    fn on_resume(&self, entity: &Entity) {
        let _ = entity;
    }

    /// Called exactly once per object after snapshot restore.
    /// `restored` is false when no persisted state existed for the object.
    fn on_state_loaded(&self, entity: &Entity, restored: bool) {
        let _ = (entity, restored);
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}
