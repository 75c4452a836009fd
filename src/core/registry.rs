//! Thread-safe registry of fleet entities.
//!
//! One `parking_lot::Mutex` guards the backing store. It is held only for the
//! structural operation itself; snapshots are copied out and the lock is
//! released before the caller looks at them. Notifications are emitted under
//! the lock so observers see them in the same order as the operations.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::entity::{Entity, EntityId, EntitySnapshot, Vehicle};
use crate::core::notify::{Notification, NullSink, SharedSink};
use crate::core::FleetError;

/// Insertion-ordered store of entities keyed by id.
pub struct Registry {
    entities: Mutex<Vec<Arc<Entity>>>,
    sink: SharedSink,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl Registry {
    /// Empty registry reporting to `sink`.
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        Self {
            entities: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Register a vehicle as a new `Idle` entity.
    ///
    /// # Errors
    ///
    /// [`FleetError::DuplicateKey`] if the id is taken.
    pub fn add(&self, vehicle: Vehicle) -> Result<Arc<Entity>, FleetError> {
        self.insert(Arc::new(Entity::new(vehicle)))
    }

    /// Register an already constructed entity.
    ///
    /// # Errors
    ///
    /// [`FleetError::DuplicateKey`] if the id is taken.
    pub fn insert(&self, entity: Arc<Entity>) -> Result<Arc<Entity>, FleetError> {
        let mut entities = self.entities.lock();
        if entities.iter().any(|e| e.id() == entity.id()) {
            let err = FleetError::DuplicateKey(entity.id());
            self.report(&err, Some(entity.id()));
            return Err(err);
        }
        entities.push(Arc::clone(&entity));
        tracing::info!(entity = %entity.id(), total = entities.len(), "registered {}", entity.vehicle().label());
        self.sink.notify(Notification::EntityAdded {
            vehicle: entity.vehicle().clone(),
        });
        Ok(entity)
    }

    /// Remove and return an entity.
    ///
    /// Tasks that already hold the entity keep their reference; only the
    /// registry's share is dropped.
    ///
    /// # Errors
    ///
    /// - [`FleetError::NotFound`] if no such id is registered.
    /// - [`FleetError::InUse`] while a transition holds the entity.
    pub fn remove(&self, id: EntityId) -> Result<Arc<Entity>, FleetError> {
        let mut entities = self.entities.lock();
        let Some(pos) = entities.iter().position(|e| e.id() == id) else {
            let err = FleetError::NotFound(id);
            self.report(&err, Some(id));
            return Err(err);
        };
        if entities[pos].is_busy() {
            let err = FleetError::InUse(id);
            self.report(&err, Some(id));
            return Err(err);
        }
        let entity = entities.remove(pos);
        tracing::info!(entity = %id, total = entities.len(), "removed {}", entity.vehicle().label());
        self.sink.notify(Notification::EntityRemoved {
            vehicle: entity.vehicle().clone(),
        });
        Ok(entity)
    }

    /// Look an entity up without side effects.
    #[must_use]
    pub fn find_by_id(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.entities.lock().iter().find(|e| e.id() == id).cloned()
    }

    /// Independent point-in-time copy of every entity and its state.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.entities.lock().iter().map(|e| e.snapshot()).collect()
    }

    /// Registered ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.lock().iter().map(|e| e.id()).collect()
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    fn report(&self, err: &FleetError, entity: Option<EntityId>) {
        tracing::warn!("registry: {err}");
        self.sink.notify(Notification::OperationFailed {
            entity,
            reason: err.to_string(),
        });
    }
}
