//! Core agent runtime.
//!
//! The runtime is made of:
//! - A heartbeat lock that keeps a single instance running
//! - Scheduled actions with lazy content and backoff-managed delivery
//! - Core units that own their actions and are ticked by the manager
//! - A fixed-interval tick loop with cooperative stop

pub mod action;
mod backoff;
mod heartbeat;
mod manager;
mod registry;
mod scheduler;
mod unit;

pub use action::{ActionKind, ActionState, ScheduledAction};
pub use backoff::BackoffPolicy;
pub use heartbeat::{
    HeartbeatConfig, HeartbeatLock, HeartbeatStatus, clear_stale as clear_stale_heartbeat,
    read_status as read_heartbeat,
};
pub use manager::{CoreManager, UnitSummary};
pub use registry::{ActionRegistry, PruneReport};
pub use scheduler::{StopHandle, TickScheduler, TickStats, TickTarget, stop_channel};
pub use unit::{CoreUnit, UnitEntry, UnitFactory, UnitRegistryFile, bounded};
