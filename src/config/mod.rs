//! Configuration models for the fleet and its timings.

pub mod fleet;

pub use fleet::{FleetConfig, VehicleSpec, ENV_PREFIX};
