//! Builders to construct a fleet service from configuration.

pub mod fleet_builder;

pub use fleet_builder::{build_fleet, build_fleet_from_env, build_fleet_with_effects};
