//! Tests for error types

use fleet_dispatch::core::{Action, EntityId, FleetError, RejectReason, VehicleState};

#[test]
fn test_duplicate_key_error() {
    let err = FleetError::DuplicateKey(EntityId(4));
    assert_eq!(format!("{}", err), "duplicate key: entity #4 already registered");
    assert!(err.is_recoverable());
}

#[test]
fn test_illegal_transition_error() {
    let err = FleetError::IllegalTransition {
        state: VehicleState::UnderMaintenance,
        action: Action::Drive,
        reason: RejectReason::Illegal,
    };
    assert_eq!(
        format!("{}", err),
        "illegal transition: cannot drive while under-maintenance (not allowed in this state)"
    );
    assert!(err.is_recoverable());
    assert!(!err.is_cancelled());
}

#[test]
fn test_busy_reason_is_named() {
    let err = FleetError::IllegalTransition {
        state: VehicleState::InService,
        action: Action::Repair,
        reason: RejectReason::Busy,
    };
    assert!(err.to_string().ends_with("(vehicle is busy)"));
}

#[test]
fn test_cancelled_error() {
    let err = FleetError::Cancelled;
    assert_eq!(format!("{}", err), "operation cancelled");
    assert!(err.is_cancelled());
    assert!(!err.is_recoverable());
}

#[test]
fn test_capacity_exhausted_error() {
    let err = FleetError::CapacityExhausted { in_use: 2, capacity: 2 };
    assert_eq!(format!("{}", err), "capacity exhausted: 2/2 slots in use");
}

#[test]
fn test_invariant_violation_is_not_recoverable() {
    let err = FleetError::PoolInvariantViolation { available: 3, capacity: 2 };
    assert!(err.to_string().starts_with("pool invariant violated"));
    assert!(!err.is_recoverable());
}

#[test]
fn test_fleet_error_converts_to_anyhow() {
    use anyhow::Context;
    let result: Result<(), FleetError> = Err(FleetError::InvalidConfig("pumps must be greater than 0".into()));
    let err = result.context("building fleet").unwrap_err();
    assert_eq!(err.to_string(), "building fleet");
    assert_eq!(
        err.root_cause().to_string(),
        "invalid configuration: pumps must be greater than 0"
    );
}
