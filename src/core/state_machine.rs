//! Per-vehicle state machine.
//!
//! A single immutable [`TransitionTable`] maps `(state, action)` to either a
//! rejection or a move: run an effect, then commit the next state. The table
//! is shared by every entity; each entity carries only its current state.
//!
//! ```text
//!                  Drive            Refuel                  Repair
//! Idle             short -> Active  long (InService) -> Idle long -> UnderMaintenance
//! Active           long  -> Idle    reject                  short -> UnderMaintenance
//! InService        reject           long -> Idle            reject (busy)
//! UnderMaintenance reject           reject                  long -> Idle
//! ```
//!
//! ## Rules
//! - Calls for one entity run one at a time, in the order they started.
//! - A rejection never touches the state.
//! - The committed state changes only after the effect finished; a cancelled
//!   or dropped effect leaves the state where it was.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::effects::{Effect, EffectLength, EffectRunner, EffectTiming, SimulatedEffects};
use crate::core::entity::Entity;
use crate::core::notify::{Notification, NullSink, SharedSink};
use crate::core::resource_pool::{Permit, ResourcePool};
use crate::core::FleetError;

/// Operational state of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    /// Parked, every action available.
    Idle,
    /// On the road.
    Active,
    /// At a pump.
    InService,
    /// In the workshop.
    UnderMaintenance,
}

impl VehicleState {
    /// All states in table order.
    pub const ALL: [Self; 4] = [Self::Idle, Self::Active, Self::InService, Self::UnderMaintenance];

    const fn index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::InService => 2,
            Self::UnderMaintenance => 3,
        }
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::InService => "in-service",
            Self::UnderMaintenance => "under-maintenance",
        })
    }
}

/// Action a caller can request on a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Drive the vehicle.
    Drive,
    /// Refuel (or recharge) the vehicle.
    Refuel,
    /// Repair the vehicle.
    Repair,
}

impl Action {
    /// All actions in table order.
    pub const ALL: [Self; 3] = [Self::Drive, Self::Refuel, Self::Repair];

    const fn index(self) -> usize {
        match self {
            Self::Drive => 0,
            Self::Refuel => 1,
            Self::Repair => 2,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drive => "drive",
            Self::Refuel => "refuel",
            Self::Repair => "repair",
        })
    }
}

/// Why a cell rejects its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The action makes no sense in this state.
    Illegal,
    /// The vehicle is occupied by other work.
    Busy,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Illegal => "not allowed in this state",
            Self::Busy => "vehicle is busy",
        })
    }
}

/// One cell of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run an effect, then commit `next`.
    Move {
        /// Effect duration class.
        effect: EffectLength,
        /// State published while the effect runs, if any.
        through: Option<VehicleState>,
        /// State committed after the effect.
        next: VehicleState,
    },
    /// Refuse the action; state is unchanged.
    Reject(RejectReason),
}

impl Transition {
    const fn step(effect: EffectLength, next: VehicleState) -> Self {
        Self::Move {
            effect,
            through: None,
            next,
        }
    }
}

/// Immutable `(state, action) -> transition` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    cells: [[Transition; 3]; 4],
}

impl TransitionTable {
    /// The fleet's transition table.
    #[must_use]
    pub const fn standard() -> Self {
        use EffectLength::{Long, Short};
        use VehicleState::{Active, Idle, InService, UnderMaintenance};

        let illegal = Transition::Reject(RejectReason::Illegal);
        Self {
            cells: [
                // Idle
                [
                    Transition::step(Short, Active),
                    Transition::Move {
                        effect: Long,
                        through: Some(InService),
                        next: Idle,
                    },
                    Transition::step(Long, UnderMaintenance),
                ],
                // Active
                [
                    Transition::step(Long, Idle),
                    illegal,
                    Transition::step(Short, UnderMaintenance),
                ],
                // InService
                [
                    illegal,
                    Transition::step(Long, Idle),
                    Transition::Reject(RejectReason::Busy),
                ],
                // UnderMaintenance
                [illegal, illegal, Transition::step(Long, Idle)],
            ],
        }
    }

    /// Cell for `(state, action)`.
    #[must_use]
    pub const fn lookup(&self, state: VehicleState, action: Action) -> Transition {
        self.cells[state.index()][action.index()]
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// A committed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transitioned {
    /// Action that ran.
    pub action: Action,
    /// State before the action.
    pub from: VehicleState,
    /// State after the action.
    pub to: VehicleState,
}

/// Publishes a transient state for the duration of an effect and puts the
/// original back unless the transition commits.
struct TransientState<'a> {
    entity: &'a Entity,
    restore: Option<VehicleState>,
}

impl<'a> TransientState<'a> {
    fn enter(entity: &'a Entity, from: VehicleState, through: Option<VehicleState>) -> Self {
        let restore = through.map(|state| {
            entity.set_state(state);
            from
        });
        Self { entity, restore }
    }

    fn commit(mut self, next: VehicleState) {
        self.restore = None;
        self.entity.set_state(next);
    }
}

impl Drop for TransientState<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.restore.take() {
            self.entity.set_state(state);
        }
    }
}

/// A station slot held for one effect. Reports `PumpReleased` once the slot
/// is back in the pool.
struct StationSlot<'a> {
    permit: Option<Permit>,
    entity: &'a Entity,
    sink: &'a SharedSink,
}

impl Drop for StationSlot<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.sink.notify(Notification::PumpReleased {
            entity: self.entity.id(),
        });
    }
}

/// Dispatches actions through the transition table.
///
/// Cheap to clone; clones share the table, the effect runner and the sink.
#[derive(Clone)]
pub struct StateMachine {
    table: Arc<TransitionTable>,
    timing: EffectTiming,
    effects: Arc<dyn EffectRunner>,
    sink: SharedSink,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("table", &self.table)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl StateMachine {
    /// Standard table, simulated effects, no notifications.
    #[must_use]
    pub fn new(timing: EffectTiming) -> Self {
        Self {
            table: Arc::new(TransitionTable::standard()),
            timing,
            effects: Arc::new(SimulatedEffects),
            sink: Arc::new(NullSink),
        }
    }

    /// Replace the effect runner.
    #[must_use]
    pub fn with_effects(mut self, effects: Arc<dyn EffectRunner>) -> Self {
        self.effects = effects;
        self
    }

    /// Attach a notification sink.
    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Shared transition table.
    #[must_use]
    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Effect durations.
    #[must_use]
    pub const fn timing(&self) -> EffectTiming {
        self.timing
    }

    /// Apply `action` to `entity`.
    ///
    /// Waits for earlier calls on the same entity to finish, then looks up
    /// the cell for the current state. A rejection returns
    /// [`FleetError::IllegalTransition`] and reports `OperationFailed`. A move
    /// runs its effect and then commits the next state, reporting
    /// `StateChanged` when the state actually differs.
    ///
    /// # Errors
    ///
    /// - [`FleetError::IllegalTransition`] when the table rejects the action.
    /// - [`FleetError::Cancelled`] when `token` fires while waiting for the
    ///   entity or during the effect; the state is left as it was.
    pub async fn apply(
        &self,
        entity: &Entity,
        action: Action,
        token: &CancellationToken,
    ) -> Result<Transitioned, FleetError> {
        self.dispatch(entity, action, None, token).await
    }

    /// Apply `action` to `entity` while holding one slot of `station` for
    /// the effect.
    ///
    /// The entity's turn is taken and the cell checked first, so a busy or
    /// rejected vehicle never occupies a slot. Only then does the call queue
    /// for the station, reporting `QueuedForPump`, `PumpAssigned` and, once
    /// the slot is back in the pool, `PumpReleased`.
    ///
    /// # Errors
    ///
    /// As [`Self::apply`]; [`FleetError::Cancelled`] also covers the wait
    /// for a slot.
    pub async fn apply_at_station(
        &self,
        entity: &Entity,
        action: Action,
        station: &ResourcePool,
        token: &CancellationToken,
    ) -> Result<Transitioned, FleetError> {
        self.dispatch(entity, action, Some(station), token).await
    }

    async fn dispatch(
        &self,
        entity: &Entity,
        action: Action,
        station: Option<&ResourcePool>,
        token: &CancellationToken,
    ) -> Result<Transitioned, FleetError> {
        let _turn = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(entity = %entity.id(), %action, "cancelled while queued for entity");
                return Err(FleetError::Cancelled);
            }
            guard = entity.transition_lock().lock() => guard,
        };

        let from = entity.state();
        let (effect, through, next) = match self.table.lookup(from, action) {
            Transition::Reject(reason) => {
                let err = FleetError::IllegalTransition {
                    state: from,
                    action,
                    reason,
                };
                tracing::warn!(entity = %entity.id(), "{err}");
                self.sink.notify(Notification::OperationFailed {
                    entity: Some(entity.id()),
                    reason: err.to_string(),
                });
                return Err(err);
            }
            Transition::Move {
                effect,
                through,
                next,
            } => (effect, through, next),
        };

        let _slot = match station {
            Some(pool) => Some(self.take_slot(entity, pool, token).await?),
            None => None,
        };

        let verb = match action {
            Action::Refuel => entity.vehicle().capabilities.energy.service_verb(),
            Action::Drive => "drive",
            Action::Repair => "repair",
        };
        tracing::debug!(
            entity = %entity.id(),
            "{} starts {verb} from {from}",
            entity.vehicle().label()
        );

        let transient = TransientState::enter(entity, from, through);
        let spec = Effect {
            entity: entity.id(),
            action,
            from,
            length: effect,
            duration: self.timing.duration(effect),
        };
        self.effects.run(&spec, token).await?;
        transient.commit(next);

        if from != next {
            self.sink.notify(Notification::StateChanged {
                entity: entity.id(),
                from,
                to: next,
            });
        }
        tracing::info!(entity = %entity.id(), "{} finished {verb}: {from} -> {next}", entity.vehicle().label());
        Ok(Transitioned {
            action,
            from,
            to: next,
        })
    }

    async fn take_slot<'a>(
        &'a self,
        entity: &'a Entity,
        station: &ResourcePool,
        token: &CancellationToken,
    ) -> Result<StationSlot<'a>, FleetError> {
        self.sink.notify(Notification::QueuedForPump {
            entity: entity.id(),
        });
        let permit = station.acquire(token).await?;
        self.sink.notify(Notification::PumpAssigned {
            entity: entity.id(),
        });
        tracing::debug!(
            entity = %entity.id(),
            in_use = station.capacity() - station.available(),
            "pump assigned to {}",
            entity.vehicle().label()
        );
        Ok(StationSlot {
            permit: Some(permit),
            entity,
            sink: &self.sink,
        })
    }
}
