//! VoltLink agent — library crate for the edge runtime.
//!
//! Re-exports all modules so external crates (e.g. `vl-e2e-tests`) can
//! access `ConnectionManager`, `CommandExecutor`, `AdaptiveScheduler`,
//! and the collaborator traits.

pub mod collector;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod single_flight;
pub mod sinks;
pub mod status;

pub use collector::Collector;
pub use config::AgentConfig;
pub use connection::{ConnectionConfig, ConnectionManager, DeviceStats};
pub use error::{AgentError, AgentResult};
pub use executor::CommandExecutor;
pub use scheduler::{AdaptiveScheduler, ScheduleState, SchedulerConfig, next_interval};
pub use single_flight::SingleFlight;
pub use sinks::{DeviceStore, FileDeviceStore, MemoryDeviceStore, MemorySink, ReadingSink};
pub use status::StatusBroadcaster;
