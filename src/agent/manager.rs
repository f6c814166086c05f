//! Core manager: owns the heartbeat lock and the set of active units.
//!
//! Startup runs in a fixed order: take the heartbeat lock, load units from
//! the registry file, then initialize each unit. A failure at any step
//! releases whatever was already acquired and is returned to the caller.

use std::panic::AssertUnwindSafe;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;

use crate::agent::heartbeat::{HeartbeatConfig, HeartbeatLock};
use crate::agent::scheduler::TickTarget;
use crate::agent::unit::{CoreUnit, UnitFactory, UnitRegistryFile};
use crate::error::{RegistryError, StartupError, UnitError};

struct UnitSlot {
    unit: Box<dyn CoreUnit>,
    active: bool,
}

/// Snapshot of one unit for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSummary {
    pub name: String,
    pub active: bool,
    pub pending_actions: usize,
}

/// Coordinates unit lifecycle and the per-tick fan-out.
pub struct CoreManager {
    heartbeat_config: HeartbeatConfig,
    heartbeat: Option<HeartbeatLock>,
    units: Vec<UnitSlot>,
    ticks: u64,
}

impl CoreManager {
    /// Create a manager. Nothing is acquired until `startup`.
    pub fn new(heartbeat_config: HeartbeatConfig) -> Self {
        Self {
            heartbeat_config,
            heartbeat: None,
            units: Vec::new(),
            ticks: 0,
        }
    }

    /// Full startup: heartbeat, registry load, unit initialization.
    ///
    /// On error everything acquired so far is released.
    pub async fn startup(
        &mut self,
        registry_path: &Path,
        factory: &dyn UnitFactory,
    ) -> Result<(), StartupError> {
        self.start_heartbeat()?;

        let result = match self.load_units(registry_path, factory) {
            Ok(()) => self.start_units().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::error!("Startup failed: {}", e);
            self.shutdown().await;
            return Err(e);
        }
        Ok(())
    }

    /// Take the heartbeat lock.
    pub fn start_heartbeat(&mut self) -> Result<(), StartupError> {
        if self.heartbeat.as_ref().is_some_and(HeartbeatLock::is_held) {
            return Ok(());
        }
        let lock = HeartbeatLock::acquire(self.heartbeat_config.clone())?;
        self.heartbeat = Some(lock);
        Ok(())
    }

    /// Build every enabled unit listed in the registry file.
    pub fn load_units(
        &mut self,
        registry_path: &Path,
        factory: &dyn UnitFactory,
    ) -> Result<(), StartupError> {
        let registry = UnitRegistryFile::load(registry_path)?;
        for entry in registry.enabled() {
            let unit = factory.build(entry)?;
            tracing::info!("Loaded core: {} ({})", entry.name, entry.kind);
            self.add(unit)?;
        }
        if self.units.is_empty() {
            tracing::warn!("No enabled cores in {}", registry_path.display());
        }
        Ok(())
    }

    /// Register an already constructed unit. It starts inactive.
    pub fn add(&mut self, unit: Box<dyn CoreUnit>) -> Result<(), RegistryError> {
        let name = unit.name().to_string();
        if self.units.iter().any(|slot| slot.unit.name() == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        tracing::debug!("Added core: {}", name);
        self.units.push(UnitSlot {
            unit,
            active: false,
        });
        Ok(())
    }

    /// Initialize loaded units in order, marking each active on success.
    ///
    /// Stops at the first failure.
    pub async fn start_units(&mut self) -> Result<(), StartupError> {
        for slot in self.units.iter_mut().filter(|slot| !slot.active) {
            let name = slot.unit.name().to_string();
            match slot.unit.initialize().await {
                Ok(()) => {
                    slot.active = true;
                    tracing::info!("Started core: {}", name);
                }
                Err(source) => {
                    return Err(StartupError::UnitInit { name, source });
                }
            }
        }
        Ok(())
    }

    /// Run one tick at the current wall-clock time.
    pub async fn tick(&mut self) {
        self.tick_at(Utc::now()).await;
    }

    /// Refresh the heartbeat, then tick every active unit in load order.
    ///
    /// Errors and panics from a unit are logged and do not affect other units
    /// or later ticks.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) {
        self.ticks += 1;
        tracing::trace!("Tick {} at {}", self.ticks, now.timestamp());

        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.beat().await;
        }

        for slot in self.units.iter_mut().filter(|slot| slot.active) {
            if let Err(e) = tick_unit(slot.unit.as_mut(), now).await {
                tracing::error!("{}", e);
            }
        }
    }

    /// Shut down every unit and release the heartbeat. Safe to call more
    /// than once.
    pub async fn shutdown(&mut self) {
        for slot in self.units.iter_mut() {
            let name = slot.unit.name().to_string();
            let outcome = AssertUnwindSafe(slot.unit.shutdown()).catch_unwind().await;
            if outcome.is_err() {
                tracing::error!("Error shutting down core {}: panicked", name);
            } else if slot.active {
                tracing::info!("Stopped core: {}", name);
            }
            slot.active = false;
        }

        if let Some(mut heartbeat) = self.heartbeat.take()
            && let Err(e) = heartbeat.release()
        {
            tracing::error!("Failed to release heartbeat: {}", e);
        }
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units
            .iter()
            .map(|slot| slot.unit.name().to_string())
            .collect()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.units
            .iter()
            .any(|slot| slot.active && slot.unit.name() == name)
    }

    pub fn active_count(&self) -> usize {
        self.units.iter().filter(|slot| slot.active).count()
    }

    pub fn summaries(&self) -> Vec<UnitSummary> {
        self.units
            .iter()
            .map(|slot| UnitSummary {
                name: slot.unit.name().to_string(),
                active: slot.active,
                pending_actions: slot.unit.pending_actions(),
            })
            .collect()
    }

    pub fn heartbeat_held(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(HeartbeatLock::is_held)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[async_trait]
impl TickTarget for CoreManager {
    async fn tick(&mut self) {
        CoreManager::tick(self).await;
    }

    async fn shutdown(&mut self) {
        CoreManager::shutdown(self).await;
    }
}

/// Tick one unit, turning a panic into `UnitError::Panicked`.
async fn tick_unit(unit: &mut dyn CoreUnit, now: DateTime<Utc>) -> Result<(), UnitError> {
    let name = unit.name().to_string();
    match AssertUnwindSafe(unit.tick(now)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(UnitError::Panicked {
            name,
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
