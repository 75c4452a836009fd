//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use fleet_dispatch::config::{FleetConfig, VehicleSpec};
use fleet_dispatch::core::{Vehicle, VehicleKind};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let cfg = FleetConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.pumps, 2);
    assert_eq!(cfg.timing().short, Duration::from_millis(500));
    assert_eq!(cfg.timing().long, Duration::from_millis(2000));
}

#[test]
fn test_zero_pumps_is_invalid() {
    let cfg = FleetConfig {
        pumps: 0,
        ..FleetConfig::default()
    };
    assert_eq!(cfg.validate().unwrap_err(), "pumps must be greater than 0");
}

#[test]
fn test_long_shorter_than_short_is_invalid() {
    let cfg = FleetConfig {
        short_effect_ms: 800,
        long_effect_ms: 200,
        ..FleetConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_notification_buffer_is_invalid() {
    let cfg = FleetConfig {
        notification_buffer: 0,
        ..FleetConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_repeated_vehicle_id_is_invalid() {
    let v = VehicleSpec {
        id: 3,
        kind: VehicleKind::Car,
        make: "Kia".into(),
        model: "Rio".into(),
        year: 2014,
    };
    let cfg = FleetConfig {
        vehicles: vec![v.clone(), v],
        ..FleetConfig::default()
    };
    assert_eq!(cfg.validate().unwrap_err(), "vehicle id 3 listed twice");
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "pumps": 3,
        "short_effect_ms": 100,
        "long_effect_ms": 400,
        "vehicles": [
            { "id": 1, "kind": "electric_car", "make": "Tesla", "model": "Model 3", "year": 2023 }
        ]
    }"#;

    let cfg = FleetConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pumps, 3);
    assert_eq!(cfg.notification_buffer, FleetConfig::default().notification_buffer);
    let vehicle: Vehicle = cfg.vehicles[0].clone().into();
    assert_eq!(vehicle.capabilities.energy.service_verb(), "recharge");
}

#[test]
fn test_config_from_json_rejects_invalid_values() {
    let err = FleetConfig::from_json_str(r#"{ "pumps": 0 }"#).unwrap_err();
    assert!(err.contains("pumps"));
    let err = FleetConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_env_overrides_defaults() {
    let cfg = FleetConfig::from_lookup(lookup(&[
        ("FLEET_PUMPS", "4"),
        ("FLEET_LONG_EFFECT_MS", " 3000 "),
        ("FLEET_LOG_NOTIFICATIONS", "false"),
    ]))
    .unwrap();
    assert_eq!(cfg.pumps, 4);
    assert_eq!(cfg.long_effect_ms, 3000);
    assert_eq!(cfg.short_effect_ms, 500);
    assert!(!cfg.log_notifications);
}

#[test]
fn test_env_parse_error_names_variable() {
    let err = FleetConfig::from_lookup(lookup(&[("FLEET_PUMPS", "many")])).unwrap_err();
    assert!(err.starts_with("FLEET_PUMPS=\"many\" is invalid"), "{err}");
}

#[test]
fn test_env_values_are_validated() {
    assert!(FleetConfig::from_lookup(lookup(&[("FLEET_PUMPS", "0")])).is_err());
}
