//! # Fleet Dispatch
//!
//! A concurrent resource-admission and per-entity state-machine engine for a
//! fleet of vehicles sharing a refueling station with a fixed number of pumps.
//!
//! ## Core Problem Solved
//!
//! Many vehicles want service at once, but the station only has a few pumps
//! and a vehicle can only do one thing at a time:
//!
//! - **Scarce Resource**: at most `C` refuels run concurrently; the rest queue
//!   in arrival order
//! - **Shared Registry**: producers add and remove vehicles while readers take
//!   consistent snapshots
//! - **Stateful Entities**: whether a vehicle may drive, refuel or be repaired
//!   depends on what it is doing now
//! - **Interruptible Work**: every wait can be cancelled without leaking a pump
//!
//! ## Key Features
//!
//! - **FIFO Admission**: `ResourcePool` hands freed pumps to the oldest waiter,
//!   from async tasks and OS threads alike
//! - **Table-Driven State Machine**: `(state, action) -> (effect, next state)`
//!   with per-entity serialization
//! - **Orchestration**: run-all, run-first and with-cancellation combinators
//!   plus in-flight operation tracking
//! - **Notifications**: explicit sinks for registry and state changes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fleet_dispatch::builders::build_fleet;
//! use fleet_dispatch::config::FleetConfig;
//! use fleet_dispatch::core::{Action, Vehicle, VehicleKind};
//! use tokio_util::sync::CancellationToken;
//!
//! let fleet = build_fleet(&FleetConfig::default(), None)?;
//! fleet.add(Vehicle::new(1, VehicleKind::Car, "Toyota", "Camry", 2022))?;
//!
//! let token = CancellationToken::new();
//! fleet.apply(1.into(), Action::Drive, &token).await?;
//! fleet.apply(1.into(), Action::Drive, &token).await?;
//! fleet.refuel_at_station(1.into(), &token).await?;
//!
//! for entry in fleet.snapshot() {
//!     println!("{} -> {}", entry.vehicle.label(), entry.state);
//! }
//! ```
//!
//! For complete scenarios, see:
//! - `tests/admission_test.rs` - pump contention and cancellation
//! - `tests/fleet_service_test.rs` - end-to-end fleet workflows

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core fleet abstractions: registry, admission, state machine, orchestration.
pub mod core;
/// Configuration models for the fleet and its timings.
pub mod config;
/// Builders to construct a fleet service from configuration.
pub mod builders;
/// Runtime adapters, the fleet service and its command surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
