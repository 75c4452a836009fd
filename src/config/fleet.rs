//! Fleet configuration structures.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{EffectTiming, Vehicle, VehicleKind};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "FLEET_";

/// A vehicle to register when the fleet is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSpec {
    /// Unique identifier.
    pub id: u64,
    /// Vehicle category.
    pub kind: VehicleKind,
    /// Manufacturer.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Model year.
    pub year: u16,
}

impl From<VehicleSpec> for Vehicle {
    fn from(spec: VehicleSpec) -> Self {
        Self::new(spec.id, spec.kind, spec.make, spec.model, spec.year)
    }
}

/// Root fleet configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Number of pumps at the station.
    pub pumps: u32,
    /// Duration of short effects in milliseconds.
    pub short_effect_ms: u64,
    /// Duration of long effects in milliseconds.
    pub long_effect_ms: u64,
    /// Notifications kept in the service journal.
    pub notification_buffer: usize,
    /// Forward notifications to the tracing log.
    pub log_notifications: bool,
    /// Vehicles registered at startup.
    pub vehicles: Vec<VehicleSpec>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            pumps: 2,
            short_effect_ms: 500,
            long_effect_ms: 2000,
            notification_buffer: 1024,
            log_notifications: true,
            vehicles: Vec::new(),
        }
    }
}

impl FleetConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.pumps == 0 {
            return Err("pumps must be greater than 0".into());
        }
        if self.short_effect_ms == 0 {
            return Err("short_effect_ms must be greater than 0".into());
        }
        if self.long_effect_ms < self.short_effect_ms {
            return Err("long_effect_ms must not be shorter than short_effect_ms".into());
        }
        if self.notification_buffer == 0 {
            return Err("notification_buffer must be greater than 0".into());
        }
        for (i, v) in self.vehicles.iter().enumerate() {
            if self.vehicles[..i].iter().any(|other| other.id == v.id) {
                return Err(format!("vehicle id {} listed twice", v.id));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `FLEET_*` process environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a validation failure.
    pub fn from_env() -> Result<Self, String> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by variables resolved through `lookup`.
    ///
    /// Recognized names: `FLEET_PUMPS`, `FLEET_SHORT_EFFECT_MS`,
    /// `FLEET_LONG_EFFECT_MS`, `FLEET_NOTIFICATION_BUFFER`,
    /// `FLEET_LOG_NOTIFICATIONS`.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        override_from(&lookup, "PUMPS", &mut cfg.pumps)?;
        override_from(&lookup, "SHORT_EFFECT_MS", &mut cfg.short_effect_ms)?;
        override_from(&lookup, "LONG_EFFECT_MS", &mut cfg.long_effect_ms)?;
        override_from(&lookup, "NOTIFICATION_BUFFER", &mut cfg.notification_buffer)?;
        override_from(&lookup, "LOG_NOTIFICATIONS", &mut cfg.log_notifications)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Effect durations as configured.
    #[must_use]
    pub const fn timing(&self) -> EffectTiming {
        EffectTiming::new(
            Duration::from_millis(self.short_effect_ms),
            Duration::from_millis(self.long_effect_ms),
        )
    }
}

fn override_from<F, T>(lookup: &F, key: &str, field: &mut T) -> Result<(), String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{key}");
    if let Some(raw) = lookup(&name) {
        *field = raw
            .trim()
            .parse()
            .map_err(|e| format!("{name}={raw:?} is invalid: {e}"))?;
    }
    Ok(())
}
