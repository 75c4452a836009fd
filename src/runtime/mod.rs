//! Runtime adapters, the fleet service and its command surface.

pub mod api;
pub mod service;
pub mod tokio_spawner;

pub use api::{handle_command, Command, CommandResponse, OperationSummary};
pub use service::FleetService;
pub use tokio_spawner::TokioSpawner;
