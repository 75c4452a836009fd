//! Fleet service: registry, pumps, state machine and orchestrator wired
//! together behind one handle.
//!
//! ## Architecture
//! ```text
//! add/remove/snapshot ──► Registry ──► sink
//! apply(id, action)   ──► Registry lookup ──► tracker.begin ──► StateMachine
//! refuel_at_station   ──► Registry lookup ──► tracker.begin ──► StateMachine turn
//!                                                              └► pumps.acquire ──► Refuel
//! refuel_fleet/apply_all ──► Orchestrator::run_all ──► one task per request
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{
    Action, Entity, EntityId, EntitySnapshot, FleetError, InMemorySink, Notification,
    Orchestrator, PendingOperation, PoolStats, Registry, ResourcePool, RunReport, SharedSink,
    StateMachine, Transitioned, Vehicle,
};
use crate::runtime::TokioSpawner;

/// Handle to a running fleet.
///
/// Cheap to clone; clones share every component.
#[derive(Clone)]
pub struct FleetService {
    registry: Arc<Registry>,
    pumps: ResourcePool,
    machine: StateMachine,
    orchestrator: Orchestrator<TokioSpawner>,
    sink: SharedSink,
    journal: Option<Arc<InMemorySink>>,
}

impl std::fmt::Debug for FleetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetService")
            .field("registry", &self.registry)
            .field("pumps", &self.pumps)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl FleetService {
    /// Assemble a service from its parts.
    ///
    /// `sink` receives the service's own failure reports; the registry and
    /// the machine are expected to report to the same sink.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        pumps: ResourcePool,
        machine: StateMachine,
        orchestrator: Orchestrator<TokioSpawner>,
        sink: SharedSink,
    ) -> Self {
        Self {
            registry,
            pumps,
            machine,
            orchestrator,
            sink,
            journal: None,
        }
    }

    /// Keep a journal readable through [`Self::recent_notifications`].
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<InMemorySink>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Register a vehicle.
    ///
    /// # Errors
    ///
    /// [`FleetError::DuplicateKey`] if the id is taken.
    pub fn add(&self, vehicle: Vehicle) -> Result<EntitySnapshot, FleetError> {
        self.registry.add(vehicle).map(|e| e.snapshot())
    }

    /// Remove a vehicle.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`] or [`FleetError::InUse`].
    pub fn remove(&self, id: EntityId) -> Result<Vehicle, FleetError> {
        self.registry.remove(id).map(|e| e.vehicle().clone())
    }

    /// Point-in-time copy of the fleet.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.registry.snapshot()
    }

    /// Apply an action to one vehicle.
    ///
    /// The operation is tracked while it runs, so [`Self::cancel_entity`] and
    /// [`Self::cancel_all`] reach it.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`], [`FleetError::IllegalTransition`] or
    /// [`FleetError::Cancelled`].
    pub async fn apply(
        &self,
        id: EntityId,
        action: Action,
        token: &CancellationToken,
    ) -> Result<Transitioned, FleetError> {
        let entity = self.lookup(id)?;
        let op = self.orchestrator.tracker().begin(id, action, token);
        self.machine.apply(&entity, action, op.token()).await
    }

    /// Refuel the vehicle at the station.
    ///
    /// The vehicle's turn comes first: a vehicle that is busy or cannot
    /// refuel never queues for a pump. Once admitted, the pump is held for
    /// the whole refuel and returned on every exit path.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`], [`FleetError::IllegalTransition`] or
    /// [`FleetError::Cancelled`].
    pub async fn refuel_at_station(
        &self,
        id: EntityId,
        token: &CancellationToken,
    ) -> Result<Transitioned, FleetError> {
        let entity = self.lookup(id)?;
        let op = self.orchestrator.tracker().begin(id, Action::Refuel, token);
        self.machine
            .apply_at_station(&entity, Action::Refuel, &self.pumps, op.token())
            .await
    }

    /// Run a batch of `(vehicle, action)` requests concurrently.
    ///
    /// `Refuel` requests go through the station. The report indexes match
    /// the request order.
    pub async fn apply_all<I>(&self, requests: I, token: &CancellationToken) -> RunReport<Transitioned>
    where
        I: IntoIterator<Item = (EntityId, Action)>,
    {
        let ops: Vec<_> = requests
            .into_iter()
            .map(|(id, action)| {
                let svc = self.clone();
                let token = token.clone();
                async move {
                    match action {
                        Action::Refuel => svc.refuel_at_station(id, &token).await,
                        _ => svc.apply(id, action, &token).await,
                    }
                }
            })
            .collect();
        self.orchestrator.run_all(ops).await
    }

    /// Send every registered vehicle to the station at once.
    pub async fn refuel_fleet(&self, token: &CancellationToken) -> RunReport<Transitioned> {
        let ids = self.registry.ids();
        tracing::info!(vehicles = ids.len(), pumps = self.pumps.capacity(), "refueling fleet");
        self.apply_all(ids.into_iter().map(|id| (id, Action::Refuel)), token)
            .await
    }

    /// Cancel every in-flight operation on one vehicle.
    pub fn cancel_entity(&self, id: EntityId) -> usize {
        self.orchestrator.tracker().cancel_entity(id)
    }

    /// Cancel every in-flight operation.
    pub fn cancel_all(&self) -> usize {
        self.orchestrator.tracker().cancel_all()
    }

    /// Operations currently running.
    #[must_use]
    pub fn in_flight(&self) -> Vec<PendingOperation> {
        self.orchestrator.tracker().in_flight()
    }

    /// Station utilization.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pumps.stats()
    }

    /// Journaled notifications, oldest first. Empty without a journal.
    #[must_use]
    pub fn recent_notifications(&self) -> Vec<Notification> {
        self.journal
            .as_ref()
            .map(|j| j.events())
            .unwrap_or_default()
    }

    /// Shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Pump pool.
    #[must_use]
    pub const fn pumps(&self) -> &ResourcePool {
        &self.pumps
    }

    /// State machine.
    #[must_use]
    pub const fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Orchestrator for ad-hoc batches.
    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator<TokioSpawner> {
        &self.orchestrator
    }

    fn lookup(&self, id: EntityId) -> Result<Arc<Entity>, FleetError> {
        self.registry.find_by_id(id).ok_or_else(|| {
            let err = FleetError::NotFound(id);
            tracing::warn!("fleet: {err}");
            self.sink.notify(Notification::OperationFailed {
                entity: Some(id),
                reason: err.to_string(),
            });
            err
        })
    }
}
