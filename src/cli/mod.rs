//! Command-line interface.
//!
//! `postclaw` with no subcommand runs the agent.

mod extract;
mod heartbeat;
mod run;
mod units;

pub use extract::run_extract_command;
pub use heartbeat::{HeartbeatCommand, run_heartbeat_command};
pub use run::run_agent;
pub use units::run_units_command;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "postclaw", version, about = "Autonomous social posting agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the agent until interrupted (default)
    Run,

    /// List the cores in the registry file
    Units,

    /// Inspect or clear the heartbeat lock
    #[command(subcommand)]
    Heartbeat(HeartbeatCommand),

    /// Export an account's recent posts into the content library
    Extract {
        /// Account handle, with or without the leading @
        handle: String,

        /// Maximum number of posts to export
        #[arg(long, default_value_t = 100)]
        max_posts: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_run() {
        let cli = Cli::try_parse_from(["postclaw"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_heartbeat_clear_force() {
        let cli = Cli::try_parse_from(["postclaw", "heartbeat", "clear", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Heartbeat(HeartbeatCommand::Clear { force: true }))
        ));
    }

    #[test]
    fn test_extract_args() {
        let cli = Cli::try_parse_from(["postclaw", "extract", "@naval", "--max-posts", "25"])
            .unwrap();
        match cli.command {
            Some(Command::Extract { handle, max_posts }) => {
                assert_eq!(handle, "@naval");
                assert_eq!(max_posts, 25);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["postclaw", "extract", "naval"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Extract { max_posts: 100, .. })
        ));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["postclaw", "launch"]).is_err());
    }
}
