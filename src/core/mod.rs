//! Core fleet abstractions: registry, admission, state machine, orchestration.

pub mod effects;
pub mod entity;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod resource_pool;
pub mod state_machine;

pub use effects::{Effect, EffectLength, EffectRunner, EffectTiming, SimulatedEffects};
pub use entity::{Capabilities, EnergySource, Entity, EntityId, EntitySnapshot, Vehicle, VehicleKind};
pub use error::{AppResult, FleetError};
pub use notify::{
    ChannelSink, FanoutSink, InMemorySink, Notification, NotificationSink, NullSink, SharedSink,
    TracingSink,
};
pub use orchestrator::{
    with_cancellation, CancelTrigger, First, OperationGuard, OperationTracker, Orchestrator,
    PendingOperation, Remaining, RunReport, Spawn,
};
pub use registry::Registry;
pub use resource_pool::{Permit, PoolStats, ResourcePool};
pub use state_machine::{
    Action, RejectReason, StateMachine, Transition, TransitionTable, Transitioned, VehicleState,
};
