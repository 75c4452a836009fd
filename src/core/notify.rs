//! Notification sinks.
//!
//! The registry and the state machine report what happened through a
//! [`NotificationSink`]. Sinks are called synchronously at the point the
//! change is made, so for any one entity the order of notifications is the
//! order of the operations that produced them.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::entity::{EntityId, Vehicle};
use crate::core::state_machine::VehicleState;

/// Something observable that happened to the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A vehicle was registered.
    EntityAdded {
        /// The registered vehicle.
        vehicle: Vehicle,
    },
    /// A vehicle was removed from the registry.
    EntityRemoved {
        /// The removed vehicle.
        vehicle: Vehicle,
    },
    /// A recoverable operation failed.
    OperationFailed {
        /// Target entity, when the failure concerns one.
        entity: Option<EntityId>,
        /// Human-readable reason.
        reason: String,
    },
    /// A transition committed a new state.
    StateChanged {
        /// Entity that moved.
        entity: EntityId,
        /// Previous state.
        from: VehicleState,
        /// New state.
        to: VehicleState,
    },
    /// A vehicle joined the station queue.
    QueuedForPump {
        /// Waiting vehicle.
        entity: EntityId,
    },
    /// A vehicle got a pump and starts its service.
    PumpAssigned {
        /// Vehicle at the pump.
        entity: EntityId,
    },
    /// A vehicle left its pump; the slot is free for the next in line.
    PumpReleased {
        /// Vehicle that left.
        entity: EntityId,
    },
}

impl Notification {
    /// Entity this notification is about, if any.
    #[must_use]
    pub const fn entity(&self) -> Option<EntityId> {
        match self {
            Self::EntityAdded { vehicle } | Self::EntityRemoved { vehicle } => Some(vehicle.id),
            Self::OperationFailed { entity, .. } => *entity,
            Self::StateChanged { entity, .. }
            | Self::QueuedForPump { entity }
            | Self::PumpAssigned { entity }
            | Self::PumpReleased { entity } => Some(*entity),
        }
    }
}

/// Consumer of fleet notifications.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification. Must not block for long: it is called
    /// while registry or entity locks are held.
    fn notify(&self, notification: Notification);
}

/// Sink handle shared by every component of one fleet.
pub type SharedSink = Arc<dyn NotificationSink>;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}

/// In-memory sink for testing and dev. Keeps the most recent `max_events`.
#[derive(Debug)]
pub struct InMemorySink {
    events: Mutex<VecDeque<Notification>>,
    max_events: usize,
}

impl InMemorySink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events concerning one entity, oldest first.
    #[must_use]
    pub fn events_for(&self, id: EntityId) -> Vec<Notification> {
        self.events
            .lock()
            .iter()
            .filter(|n| n.entity() == Some(id))
            .cloned()
            .collect()
    }

    /// Drop all stored events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl NotificationSink for InMemorySink {
    fn notify(&self, notification: Notification) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(notification);
    }
}

/// Queue feeding an external consumer, typically a logger thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    /// Unbounded channel; the receiver end goes to the consumer.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::EntityAdded { vehicle } => {
                tracing::info!(
                    entity = %vehicle.id,
                    cargo_kg = ?vehicle.capabilities.cargo_kg,
                    "[added] {}",
                    vehicle.label()
                );
            }
            Notification::EntityRemoved { vehicle } => {
                tracing::info!(entity = %vehicle.id, "[removed] {}", vehicle.label());
            }
            Notification::OperationFailed { entity, reason } => match entity {
                Some(id) => tracing::warn!(entity = %id, "[failed] {reason}"),
                None => tracing::warn!("[failed] {reason}"),
            },
            Notification::StateChanged { entity, from, to } => {
                tracing::info!(entity = %entity, "[state] {from} -> {to}");
            }
            Notification::QueuedForPump { entity } => {
                tracing::info!(entity = %entity, "[station] queued for a pump");
            }
            Notification::PumpAssigned { entity } => {
                tracing::info!(entity = %entity, "[station] pump assigned");
            }
            Notification::PumpReleased { entity } => {
                tracing::info!(entity = %entity, "[station] pump released");
            }
        }
    }
}

/// Delivers every notification to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    /// Empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, notification: Notification) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.notify(notification.clone());
            }
            last.notify(notification);
        }
    }
}
