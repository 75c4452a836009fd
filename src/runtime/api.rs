//! API-facing command and response models.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::VehicleSpec;
use crate::core::{
    Action, EntityId, EntitySnapshot, FleetError, PendingOperation, PoolStats, Transitioned,
    Vehicle,
};
use crate::runtime::FleetService;

/// A request against the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Register a vehicle.
    Add {
        /// Vehicle to register.
        vehicle: VehicleSpec,
    },
    /// Remove a vehicle.
    Remove {
        /// Target vehicle.
        id: EntityId,
    },
    /// Apply an action directly, without the station.
    Apply {
        /// Target vehicle.
        id: EntityId,
        /// Requested action.
        action: Action,
    },
    /// Queue for a pump and refuel.
    RefuelAtStation {
        /// Target vehicle.
        id: EntityId,
    },
    /// List every vehicle with its state.
    Snapshot,
    /// Station utilization.
    PoolStatus,
    /// Operations currently running.
    InFlight,
    /// Cancel operations on one vehicle, or all of them.
    Cancel {
        /// Target vehicle; everything when absent.
        id: Option<EntityId>,
    },
}

/// In-flight operation as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Operation id.
    pub id: Uuid,
    /// Target vehicle.
    pub entity: EntityId,
    /// Requested action.
    pub action: Action,
    /// Start time (ms since epoch).
    pub started_at_ms: u128,
}

impl From<&PendingOperation> for OperationSummary {
    fn from(op: &PendingOperation) -> Self {
        Self {
            id: op.id,
            entity: op.entity,
            action: op.action,
            started_at_ms: op.started_at_ms,
        }
    }
}

/// Result of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    /// Vehicle registered.
    Added {
        /// Its initial snapshot.
        entity: EntitySnapshot,
    },
    /// Vehicle removed.
    Removed {
        /// The removed vehicle.
        vehicle: Vehicle,
    },
    /// Action completed.
    Transitioned {
        /// Target vehicle.
        id: EntityId,
        /// What happened.
        transition: Transitioned,
    },
    /// Fleet listing.
    Snapshot {
        /// Every vehicle in registration order.
        entities: Vec<EntitySnapshot>,
    },
    /// Station utilization.
    Pool {
        /// Pool counters.
        stats: PoolStats,
    },
    /// Running operations.
    InFlight {
        /// One entry per operation.
        operations: Vec<OperationSummary>,
    },
    /// Cancellation requested.
    CancelRequested {
        /// Operations signalled.
        signalled: usize,
    },
    /// The operation was cancelled before it finished.
    Cancelled,
    /// The operation failed.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

impl From<FleetError> for CommandResponse {
    fn from(err: FleetError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Failed {
                reason: err.to_string(),
            }
        }
    }
}

fn transitioned(id: EntityId, result: Result<Transitioned, FleetError>) -> CommandResponse {
    match result {
        Ok(transition) => CommandResponse::Transitioned { id, transition },
        Err(err) => err.into(),
    }
}

/// Execute one command against the fleet.
///
/// Never fails as a whole: errors come back as [`CommandResponse::Failed`]
/// or [`CommandResponse::Cancelled`].
pub async fn handle_command(
    service: &FleetService,
    command: Command,
    token: &CancellationToken,
) -> CommandResponse {
    tracing::debug!(?command, "handling command");
    match command {
        Command::Add { vehicle } => match service.add(vehicle.into()) {
            Ok(entity) => CommandResponse::Added { entity },
            Err(err) => err.into(),
        },
        Command::Remove { id } => match service.remove(id) {
            Ok(vehicle) => CommandResponse::Removed { vehicle },
            Err(err) => err.into(),
        },
        Command::Apply { id, action } => transitioned(id, service.apply(id, action, token).await),
        Command::RefuelAtStation { id } => {
            transitioned(id, service.refuel_at_station(id, token).await)
        }
        Command::Snapshot => CommandResponse::Snapshot {
            entities: service.snapshot(),
        },
        Command::PoolStatus => CommandResponse::Pool {
            stats: service.pool_stats(),
        },
        Command::InFlight => CommandResponse::InFlight {
            operations: service.in_flight().iter().map(OperationSummary::from).collect(),
        },
        Command::Cancel { id } => CommandResponse::CancelRequested {
            signalled: id.map_or_else(|| service.cancel_all(), |id| service.cancel_entity(id)),
        },
    }
}
