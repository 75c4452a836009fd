//! Builders to construct a fleet service from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::FleetConfig;
use crate::core::{
    AppResult, EffectRunner, FanoutSink, FleetError, InMemorySink, Orchestrator, Registry,
    ResourcePool, SharedSink, SimulatedEffects, StateMachine, TracingSink,
};
use crate::runtime::{FleetService, TokioSpawner};

/// Build a fleet with simulated effects.
///
/// Must be called inside a tokio runtime. `observer` receives every
/// notification in addition to the service journal and, when enabled, the
/// tracing log.
///
/// # Errors
///
/// [`FleetError::InvalidConfig`] for an invalid config or a missing runtime.
pub fn build_fleet(cfg: &FleetConfig, observer: Option<SharedSink>) -> Result<FleetService, FleetError> {
    build_fleet_with_effects(cfg, observer, Arc::new(SimulatedEffects))
}

/// Build a fleet whose transitions run `effects`.
///
/// # Errors
///
/// As [`build_fleet`].
pub fn build_fleet_with_effects(
    cfg: &FleetConfig,
    observer: Option<SharedSink>,
    effects: Arc<dyn EffectRunner>,
) -> Result<FleetService, FleetError> {
    cfg.validate().map_err(FleetError::InvalidConfig)?;
    let spawner = TokioSpawner::try_current()?;

    let journal = Arc::new(InMemorySink::new(cfg.notification_buffer));
    let mut fanout = FanoutSink::new().with(journal.clone());
    if cfg.log_notifications {
        fanout = fanout.with(Arc::new(TracingSink));
    }
    if let Some(observer) = observer {
        fanout = fanout.with(observer);
    }
    let sink: SharedSink = Arc::new(fanout);

    let registry = Arc::new(Registry::new(sink.clone()));
    for spec in &cfg.vehicles {
        registry.add(spec.clone().into())?;
    }
    let pumps = ResourcePool::new(cfg.pumps)?;
    let machine = StateMachine::new(cfg.timing())
        .with_effects(effects)
        .with_sink(sink.clone());

    tracing::info!(
        pumps = cfg.pumps,
        vehicles = registry.len(),
        short_ms = cfg.short_effect_ms,
        long_ms = cfg.long_effect_ms,
        "fleet built"
    );
    Ok(FleetService::new(registry, pumps, machine, Orchestrator::new(spawner), sink).with_journal(journal))
}

/// Build a fleet from `FLEET_*` environment variables.
///
/// # Errors
///
/// Unparsable or invalid configuration, or no tokio runtime.
pub fn build_fleet_from_env() -> AppResult<FleetService> {
    let cfg = FleetConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("loading fleet configuration from environment")?;
    let fleet = build_fleet(&cfg, None).context("building fleet")?;
    Ok(fleet)
}
