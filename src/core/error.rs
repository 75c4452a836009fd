//! Error types for fleet operations.

use thiserror::Error;

use crate::core::entity::EntityId;
use crate::core::state_machine::{Action, RejectReason, VehicleState};

/// Errors produced by the registry, the pump pool, the state machine and the
/// orchestrator.
///
/// Everything except [`FleetError::PoolInvariantViolation`] is recoverable:
/// callers get it back as a normal `Err` and the process keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    /// An entity with this identifier is already registered.
    #[error("duplicate key: entity {0} already registered")]
    DuplicateKey(EntityId),
    /// No entity with this identifier is registered.
    #[error("not found: entity {0}")]
    NotFound(EntityId),
    /// The entity is held by an in-flight transition and cannot be removed.
    #[error("entity {0} is in use by an in-flight operation")]
    InUse(EntityId),
    /// The requested action is not valid in the entity's current state.
    #[error("illegal transition: cannot {action} while {state} ({reason})")]
    IllegalTransition {
        /// State the entity was in when the action was requested.
        state: VehicleState,
        /// Requested action.
        action: Action,
        /// Why the table rejects the cell.
        reason: RejectReason,
    },
    /// The operation was aborted through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
    /// No pump is free right now (non-suspending acquire only).
    #[error("capacity exhausted: {in_use}/{capacity} slots in use")]
    CapacityExhausted {
        /// Slots currently held.
        in_use: u32,
        /// Total slots.
        capacity: u32,
    },
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An orchestrated task panicked or was aborted by the runtime.
    #[error("task aborted: {0}")]
    TaskAborted(String),
    /// A slot was released without a matching acquire.
    ///
    /// This is a programming error. The pool raises it as a panic and never
    /// returns it as a value.
    #[error("pool invariant violated: release would raise available to {available} with capacity {capacity}")]
    PoolInvariantViolation {
        /// Available count the release would have produced.
        available: u32,
        /// Fixed pool capacity.
        capacity: u32,
    },
}

impl FleetError {
    /// True when the error is the distinct "aborted by request" outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for registry and state-machine misuse that is reported and
    /// otherwise ignored.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey(_)
                | Self::NotFound(_)
                | Self::InUse(_)
                | Self::IllegalTransition { .. }
                | Self::CapacityExhausted { .. }
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
