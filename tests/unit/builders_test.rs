//! Tests for builder modules

use std::sync::Arc;

use fleet_dispatch::builders::build_fleet;
use fleet_dispatch::config::{FleetConfig, VehicleSpec};
use fleet_dispatch::core::{EntityId, FleetError, InMemorySink, Notification, VehicleKind};

fn vehicles(ids: &[u64]) -> Vec<VehicleSpec> {
    ids.iter()
        .map(|&id| VehicleSpec {
            id,
            kind: VehicleKind::Car,
            make: "Skoda".into(),
            model: "Octavia".into(),
            year: 2019,
        })
        .collect()
}

#[tokio::test]
async fn test_build_fleet_registers_initial_vehicles() {
    let cfg = FleetConfig {
        pumps: 3,
        log_notifications: false,
        vehicles: vehicles(&[5, 2, 9]),
        ..FleetConfig::default()
    };
    let observer = Arc::new(InMemorySink::new(16));
    let fleet = build_fleet(&cfg, Some(observer.clone())).unwrap();

    let ids: Vec<_> = fleet.snapshot().iter().map(|e| e.vehicle.id).collect();
    assert_eq!(ids, vec![EntityId(5), EntityId(2), EntityId(9)]);
    assert_eq!(fleet.pumps().capacity(), 3);
    assert_eq!(observer.events().len(), 3);
    assert_eq!(fleet.recent_notifications(), observer.events());
    assert!(observer
        .events()
        .iter()
        .all(|n| matches!(n, Notification::EntityAdded { .. })));
}

#[tokio::test]
async fn test_build_fleet_rejects_invalid_config() {
    let cfg = FleetConfig {
        pumps: 0,
        ..FleetConfig::default()
    };
    let err = build_fleet(&cfg, None).unwrap_err();
    assert!(matches!(err, FleetError::InvalidConfig(_)));
}

#[test]
fn test_build_fleet_requires_runtime() {
    let err = build_fleet(&FleetConfig::default(), None).unwrap_err();
    assert!(matches!(err, FleetError::InvalidConfig(msg) if msg.contains("no tokio runtime")));
}

#[tokio::test]
async fn test_machine_uses_configured_timing() {
    let cfg = FleetConfig {
        short_effect_ms: 20,
        long_effect_ms: 80,
        log_notifications: false,
        ..FleetConfig::default()
    };
    let fleet = build_fleet(&cfg, None).unwrap();
    assert_eq!(fleet.machine().timing(), cfg.timing());
}
