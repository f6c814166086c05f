use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use postclaw::cli::{
    Cli, Command, run_agent, run_extract_command, run_heartbeat_command, run_units_command,
};
use postclaw::config::Config;

const LOG_FILE: &str = "agent.log";

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => return run(config).await,
        Command::Units => run_units_command(&config.agent.registry_path),
        Command::Heartbeat(cmd) => run_heartbeat_command(cmd, &config.agent.heartbeat_path),
        Command::Extract { handle, max_posts } => {
            let content_dir = config.agent.data_dir.join("content");
            run_extract_command(&handle, max_posts, &content_dir, config.social).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> ExitCode {
    let _guard = match init_tracing(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_agent(config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Agent failed to start: {}", e);
            eprintln!("Agent failed to start: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Console output plus the append-only event log under `log_dir`.
fn init_tracing(config: &Config) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.agent.log_dir)?;
    let appender = tracing_appender::rolling::never(&config.agent.log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postclaw=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_timer(ChronoUtc::rfc_3339()),
        )
        .try_init()?;

    Ok(guard)
}
