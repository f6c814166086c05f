//! Core registry listing.

use std::path::Path;

use crate::agent::UnitRegistryFile;
use crate::units::DefaultUnitFactory;

/// Print the cores listed in the registry file.
pub fn run_units_command(registry_path: &Path) -> anyhow::Result<()> {
    let registry = UnitRegistryFile::load(registry_path)?;

    println!("Cores in {}:", registry_path.display());
    println!();

    if registry.cores.is_empty() {
        println!("  (none)");
        return Ok(());
    }

    let width = registry
        .cores
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0);

    for entry in &registry.cores {
        let state = if entry.enabled { "enabled" } else { "disabled" };
        let known = if DefaultUnitFactory::KINDS.contains(&entry.kind.as_str()) {
            ""
        } else {
            "  (unknown kind)"
        };
        println!(
            "  {:width$}  {:<10}  {}{}",
            entry.name,
            entry.kind,
            state,
            known,
            width = width
        );
    }
    Ok(())
}
