//! Core unit contract and the registry file that lists units to load.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, StartupError, UnitError};

/// A pluggable periodic behaviour.
///
/// The manager calls `initialize` once at startup, `tick` on every heartbeat
/// while the unit is active, and `shutdown` once when the agent stops.
#[async_trait]
pub trait CoreUnit: Send {
    /// Name from the registry file, used in logs.
    fn name(&self) -> &str;

    /// One-time setup. An error here aborts startup.
    async fn initialize(&mut self) -> Result<(), UnitError>;

    /// Do this tick's work. Errors are logged by the manager and the unit
    /// stays active.
    async fn tick(&mut self, now: DateTime<Utc>) -> Result<(), UnitError>;

    /// Release resources and drop pending state. Must tolerate repeat calls.
    async fn shutdown(&mut self);

    /// Scheduled actions not yet delivered or abandoned.
    fn pending_actions(&self) -> usize {
        0
    }
}

/// One entry in the core registry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEntry {
    pub name: String,
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The core registry file.
///
/// ```json
/// {"cores": [{"name": "poster", "kind": "poster", "enabled": true}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRegistryFile {
    #[serde(default)]
    pub cores: Vec<UnitEntry>,
}

impl UnitRegistryFile {
    /// Read and validate a registry file. Names must be unique.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RegistryError::NotFound(path.to_path_buf()),
            _ => RegistryError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::parse(&raw, path)
    }

    pub fn parse(raw: &str, path: &Path) -> Result<Self, RegistryError> {
        let file: Self = serde_json::from_str(raw).map_err(|e| RegistryError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut seen = std::collections::HashSet::new();
        for entry in &file.cores {
            if !seen.insert(entry.name.as_str()) {
                return Err(RegistryError::DuplicateName(entry.name.clone()));
            }
        }
        Ok(file)
    }

    /// Entries with `enabled: true`, in file order.
    pub fn enabled(&self) -> impl Iterator<Item = &UnitEntry> {
        self.cores.iter().filter(|e| e.enabled)
    }
}

/// Builds concrete units from registry entries.
pub trait UnitFactory {
    fn build(&self, entry: &UnitEntry) -> Result<Box<dyn CoreUnit>, StartupError>;

    /// Kinds this factory knows how to build.
    fn kinds(&self) -> &[&'static str];
}

/// Run `fut` with a deadline, mapping expiry to an error of the caller's type.
pub async fn bounded<F, T, E>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}
