//! Tracked vehicles and their capability tags.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::state_machine::VehicleState;

/// Stable vehicle identifier, assigned by whoever builds the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Vehicle category supplied by the fleet builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    /// Passenger car.
    Car,
    /// Cargo truck.
    Truck,
    /// Passenger bus.
    Bus,
    /// Motorcycle.
    Motorcycle,
    /// Battery electric car.
    ElectricCar,
}

/// What a vehicle runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySource {
    /// Gasoline.
    Petrol,
    /// Diesel fuel.
    Diesel,
    /// Battery, charged instead of fueled.
    Electric,
}

impl EnergySource {
    /// Verb used when a pump services this vehicle.
    #[must_use]
    pub const fn service_verb(self) -> &'static str {
        match self {
            Self::Petrol | Self::Diesel => "refuel",
            Self::Electric => "recharge",
        }
    }
}

/// Behavior-relevant traits of a vehicle, resolved once from its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    /// Energy source used at the station.
    pub energy: EnergySource,
    /// Maximum cargo in kilograms, if the vehicle carries cargo at all.
    pub cargo_kg: Option<u32>,
}

impl From<VehicleKind> for Capabilities {
    fn from(kind: VehicleKind) -> Self {
        match kind {
            VehicleKind::Car => Self {
                energy: EnergySource::Petrol,
                cargo_kg: None,
            },
            VehicleKind::Truck => Self {
                energy: EnergySource::Diesel,
                cargo_kg: Some(20_000),
            },
            VehicleKind::Bus => Self {
                energy: EnergySource::Diesel,
                cargo_kg: None,
            },
            VehicleKind::Motorcycle => Self {
                energy: EnergySource::Petrol,
                cargo_kg: Some(10),
            },
            VehicleKind::ElectricCar => Self {
                energy: EnergySource::Electric,
                cargo_kg: None,
            },
        }
    }
}

/// Immutable descriptor of a vehicle. The core only reads the id; the rest
/// is carried for logging and for collaborators that render snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique identifier.
    pub id: EntityId,
    /// Vehicle category.
    pub kind: VehicleKind,
    /// Manufacturer.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Model year.
    pub year: u16,
    /// Capabilities derived from `kind` at construction.
    pub capabilities: Capabilities,
}

impl Vehicle {
    /// Describe a vehicle; capabilities are derived from `kind`.
    pub fn new(
        id: impl Into<EntityId>,
        kind: VehicleKind,
        make: impl Into<String>,
        model: impl Into<String>,
        year: u16,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            make: make.into(),
            model: model.into(),
            year,
            capabilities: Capabilities::from(kind),
        }
    }

    /// `"<make> <model>"`, used in log lines.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.make, self.model)
    }
}

/// A registered vehicle plus its live state.
///
/// Shared as `Arc<Entity>` between the registry and every task working on
/// it. The state cell is written only by the state machine, and only while
/// the transition lock is held.
#[derive(Debug)]
pub struct Entity {
    vehicle: Vehicle,
    state: RwLock<VehicleState>,
    transition: tokio::sync::Mutex<()>,
}

impl Entity {
    /// Wrap a vehicle; every new entity starts `Idle`.
    #[must_use]
    pub fn new(vehicle: Vehicle) -> Self {
        Self::with_state(vehicle, VehicleState::Idle)
    }

    pub(crate) fn with_state(vehicle: Vehicle, state: VehicleState) -> Self {
        Self {
            vehicle,
            state: RwLock::new(state),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Identifier of the underlying vehicle.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.vehicle.id
    }

    /// Immutable descriptor.
    #[must_use]
    pub const fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    /// Current state as last published by the state machine.
    #[must_use]
    pub fn state(&self) -> VehicleState {
        *self.state.read()
    }

    /// True while a transition holds this entity.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.transition.try_lock().is_err()
    }

    /// Point-in-time copy of descriptor and state.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            vehicle: self.vehicle.clone(),
            state: self.state(),
        }
    }

    pub(crate) fn set_state(&self, next: VehicleState) -> VehicleState {
        std::mem::replace(&mut *self.state.write(), next)
    }

    pub(crate) const fn transition_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.transition
    }
}

/// Independent copy of one entity, as returned by registry snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Vehicle descriptor.
    pub vehicle: Vehicle,
    /// State at the time of the snapshot.
    pub state: VehicleState,
}
