//! Concrete core units and the factory that builds them from the registry.
//!
//! | kind         | unit               |
//! |--------------|--------------------|
//! | `poster`     | [`PosterUnit`]     |
//! | `replier`    | [`ReplierUnit`]    |
//! | `diagnostic` | [`DiagnosticUnit`] |

mod diagnostic;
mod poster;
mod replier;

#[cfg(test)]
pub(crate) mod fakes;

pub use diagnostic::DiagnosticUnit;
pub use poster::{PosterUnit, draw_post_delay};
pub use replier::ReplierUnit;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::agent::{CoreUnit, PruneReport, UnitEntry, UnitFactory};
use crate::config::SchedulePolicy;
use crate::content::ContentGenerator;
use crate::error::{RegistryError, StartupError};
use crate::social::{DeliveryClient, TimelineReader};

/// Accounts watched when the target list is missing or unreadable.
pub const DEFAULT_TARGET_ACCOUNTS: &[&str] = &["PeterSchiff"];

/// Collaborators shared by every unit the factory builds.
#[derive(Clone)]
pub struct UnitDeps {
    pub schedule: SchedulePolicy,
    pub generator: Arc<dyn ContentGenerator>,
    pub delivery: Arc<dyn DeliveryClient>,
    pub timeline: Arc<dyn TimelineReader>,
    pub target_accounts_path: PathBuf,
}

/// Builds units by registry kind.
pub struct DefaultUnitFactory {
    deps: UnitDeps,
}

impl DefaultUnitFactory {
    pub const KINDS: &'static [&'static str] = &["poster", "replier", "diagnostic"];

    pub fn new(deps: UnitDeps) -> Self {
        Self { deps }
    }
}

impl UnitFactory for DefaultUnitFactory {
    fn build(&self, entry: &UnitEntry) -> Result<Box<dyn CoreUnit>, StartupError> {
        let deps = &self.deps;
        let unit: Box<dyn CoreUnit> = match entry.kind.as_str() {
            "poster" => Box::new(PosterUnit::new(
                &entry.name,
                deps.schedule.clone(),
                Arc::clone(&deps.generator),
                Arc::clone(&deps.delivery),
            )),
            "replier" => Box::new(ReplierUnit::new(
                &entry.name,
                deps.schedule.clone(),
                Arc::clone(&deps.generator),
                Arc::clone(&deps.delivery),
                Arc::clone(&deps.timeline),
                deps.target_accounts_path.clone(),
            )),
            "diagnostic" => Box::new(DiagnosticUnit::new(
                &entry.name,
                deps.schedule.diagnostic_interval,
            )),
            other => {
                return Err(RegistryError::UnknownKind {
                    name: entry.name.clone(),
                    kind: other.to_string(),
                }
                .into());
            }
        };
        Ok(unit)
    }

    fn kinds(&self) -> &[&'static str] {
        Self::KINDS
    }
}

#[derive(Debug, Deserialize)]
struct TargetAccountsFile {
    #[serde(default)]
    target_accounts: Vec<TargetAccount>,
}

#[derive(Debug, Deserialize)]
struct TargetAccount {
    handle: String,
}

/// Read the monitored account handles, falling back to
/// [`DEFAULT_TARGET_ACCOUNTS`] when the file can't be used.
pub fn load_target_accounts(path: &Path) -> Vec<String> {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| {
            serde_json::from_str::<TargetAccountsFile>(&raw).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(file) => file
            .target_accounts
            .into_iter()
            .map(|a| a.handle.trim_start_matches('@').to_string())
            .filter(|h| !h.is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(
                "Could not read target accounts from {} ({}), using defaults",
                path.display(),
                e
            );
            DEFAULT_TARGET_ACCOUNTS.iter().map(|h| h.to_string()).collect()
        }
    }
}

/// Log actions dropped by a prune pass.
fn log_abandoned(unit: &str, report: &PruneReport) {
    for action in &report.abandoned {
        tracing::error!(
            "Core {} abandoned {} {} after {} failed attempts (last error: {})",
            unit,
            action.kind.label(),
            action.id,
            action.retry_count,
            action.last_error.as_deref().unwrap_or("none")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use crate::units::fakes::{ScriptedDelivery, ScriptedGenerator, ScriptedTimeline};

    fn deps(dir: &Path) -> UnitDeps {
        UnitDeps {
            schedule: SchedulePolicy::production(),
            generator: Arc::new(ScriptedGenerator::new("text")),
            delivery: Arc::new(ScriptedDelivery::new()),
            timeline: Arc::new(ScriptedTimeline::new()),
            target_accounts_path: dir.join("target_accounts.json"),
        }
    }

    fn entry(name: &str, kind: &str) -> UnitEntry {
        UnitEntry {
            name: name.to_string(),
            kind: kind.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_factory_builds_known_kinds() {
        let dir = TempDir::new().unwrap();
        let factory = DefaultUnitFactory::new(deps(dir.path()));
        for kind in factory.kinds() {
            let name = format!("my-{kind}");
            let unit = factory.build(&entry(&name, kind)).unwrap();
            assert_eq!(unit.name(), name);
        }
    }

    #[test]
    fn test_factory_rejects_unknown_kind() {
        let dir = TempDir::new().unwrap();
        let factory = DefaultUnitFactory::new(deps(dir.path()));
        let err = factory.build(&entry("x", "teleporter")).err().unwrap();
        assert!(matches!(
            err,
            StartupError::Registry(RegistryError::UnknownKind { ref kind, .. }) if kind == "teleporter"
        ));
    }

    #[test]
    fn test_target_accounts_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target_accounts.json");
        std::fs::write(
            &path,
            r#"{"target_accounts": [{"handle": "@alice"}, {"handle": "bob"}, {"handle": ""}]}"#,
        )
        .unwrap();
        assert_eq!(load_target_accounts(&path), vec!["alice", "bob"]);
    }

    #[test]
    fn test_target_accounts_fallback() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(load_target_accounts(&missing), vec!["PeterSchiff"]);

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "[").unwrap();
        assert_eq!(load_target_accounts(&broken), vec!["PeterSchiff"]);
    }
}
