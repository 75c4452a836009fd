//! Effects executed inside state transitions.
//!
//! An effect stands for the real-world work a transition represents (a
//! drive, a refuel, a repair). It is the only place a transition suspends,
//! and it must observe the cancellation token while suspended.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::entity::EntityId;
use crate::core::state_machine::{Action, VehicleState};
use crate::core::FleetError;

/// Duration class of an effect. Concrete lengths come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectLength {
    /// Quick operation.
    Short,
    /// Lengthy operation.
    Long,
}

/// Concrete durations for each effect class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectTiming {
    /// Duration of a short effect.
    pub short: Duration,
    /// Duration of a long effect.
    pub long: Duration,
}

impl EffectTiming {
    /// Timing with the given short and long durations.
    #[must_use]
    pub const fn new(short: Duration, long: Duration) -> Self {
        Self { short, long }
    }

    /// Duration for one effect class.
    #[must_use]
    pub const fn duration(&self, length: EffectLength) -> Duration {
        match length {
            EffectLength::Short => self.short,
            EffectLength::Long => self.long,
        }
    }
}

impl Default for EffectTiming {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(2000))
    }
}

/// One effect about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    /// Entity the effect applies to.
    pub entity: EntityId,
    /// Action being performed.
    pub action: Action,
    /// State the transition started from.
    pub from: VehicleState,
    /// Duration class from the transition table.
    pub length: EffectLength,
    /// Resolved duration.
    pub duration: Duration,
}

/// Runs transition effects.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use fleet_dispatch::core::{Effect, EffectRunner, FleetError};
/// use tokio_util::sync::CancellationToken;
///
/// struct Instant;
///
/// #[async_trait]
/// impl EffectRunner for Instant {
///     async fn run(&self, _effect: &Effect, token: &CancellationToken) -> Result<(), FleetError> {
///         if token.is_cancelled() { Err(FleetError::Cancelled) } else { Ok(()) }
///     }
/// }
/// ```
#[async_trait]
pub trait EffectRunner: Send + Sync + 'static {
    /// Perform the effect. Returns `Err(FleetError::Cancelled)` if the token
    /// fires while the effect is suspended.
    async fn run(&self, effect: &Effect, token: &CancellationToken) -> Result<(), FleetError>;
}

/// Simulates effects by sleeping for their duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedEffects;

#[async_trait]
impl EffectRunner for SimulatedEffects {
    async fn run(&self, effect: &Effect, token: &CancellationToken) -> Result<(), FleetError> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(entity = %effect.entity, action = %effect.action, "effect interrupted");
                Err(FleetError::Cancelled)
            }
            () = tokio::time::sleep(effect.duration) => Ok(()),
        }
    }
}
