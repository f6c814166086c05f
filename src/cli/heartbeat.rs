//! Heartbeat inspection commands.

use std::path::Path;

use chrono::Utc;
use clap::Subcommand;

use crate::agent::{clear_stale_heartbeat, read_heartbeat};

/// A heartbeat refreshed more recently than this is treated as live.
const LIVE_THRESHOLD_SECS: i64 = 60;

#[derive(Subcommand, Debug, Clone)]
pub enum HeartbeatCommand {
    /// Show whether a heartbeat exists and when it was last refreshed
    Status,

    /// Remove a heartbeat left behind by a crashed instance
    Clear {
        /// Remove the file even if it was refreshed recently
        #[arg(long)]
        force: bool,
    },
}

/// Run a heartbeat command.
pub fn run_heartbeat_command(cmd: HeartbeatCommand, path: &Path) -> anyhow::Result<()> {
    match cmd {
        HeartbeatCommand::Status => show_status(path),
        HeartbeatCommand::Clear { force } => clear(path, force),
    }
}

fn show_status(path: &Path) -> anyhow::Result<()> {
    let Some(status) = read_heartbeat(path)? else {
        println!("No heartbeat at {}", path.display());
        return Ok(());
    };

    println!("Heartbeat: {}", status.path.display());
    match (status.last_beat, status.age(Utc::now())) {
        (Some(beat), Some(age)) => {
            println!("  Last beat: {}", beat.to_rfc3339());
            println!("  Age: {} seconds", age.num_seconds());
            if age.num_seconds() > LIVE_THRESHOLD_SECS {
                println!("  (stale; clear it with `postclaw heartbeat clear`)");
            }
        }
        _ => println!("  Unreadable timestamp: {:?}", status.raw),
    }
    Ok(())
}

fn clear(path: &Path, force: bool) -> anyhow::Result<()> {
    if !force
        && let Some(status) = read_heartbeat(path)?
        && let Some(age) = status.age(Utc::now())
        && age.num_seconds() <= LIVE_THRESHOLD_SECS
    {
        anyhow::bail!(
            "Heartbeat {} was refreshed {} seconds ago; an instance may still be running (use --force)",
            path.display(),
            age.num_seconds()
        );
    }

    if clear_stale_heartbeat(path)? {
        println!("Removed {}", path.display());
    } else {
        println!("No heartbeat at {}", path.display());
    }
    Ok(())
}
