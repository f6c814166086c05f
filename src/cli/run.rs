//! The `run` command: wire collaborators, start the cores, tick until a
//! shutdown signal arrives.

use std::sync::Arc;

use crate::agent::{CoreManager, HeartbeatConfig, TickScheduler, TickStats, stop_channel};
use crate::config::Config;
use crate::content::{ContentGenerator, ContentLibrary, MixtureGenerator};
use crate::error::Result;
use crate::llm::create_llm_provider;
use crate::social::{DeliveryClient, DryRunClient, FixtureTimeline, TimelineReader, XClient};
use crate::units::{DefaultUnitFactory, UnitDeps};

/// Build the collaborators shared by every core.
pub fn build_unit_deps(config: &Config) -> Result<UnitDeps> {
    let llm = create_llm_provider(&config.llm)?;

    let content_dir = config.agent.data_dir.join("content");
    let lore_path = config.agent.data_dir.join("lore.json");
    let library = ContentLibrary::load(&content_dir, Some(&lore_path))?;
    let generator: Arc<dyn ContentGenerator> = Arc::new(MixtureGenerator::new(
        llm,
        Arc::new(library),
        config.agent.personality_path(),
    ));

    let (delivery, timeline): (Arc<dyn DeliveryClient>, Arc<dyn TimelineReader>) =
        if config.agent.debugging {
            tracing::info!("Debugging mode: delivery suppressed, replies read from fixtures");
            (
                Arc::new(DryRunClient::new()) as Arc<dyn DeliveryClient>,
                Arc::new(FixtureTimeline::new(config.agent.reply_fixture_path()))
                    as Arc<dyn TimelineReader>,
            )
        } else {
            let x = Arc::new(XClient::new(config.social.clone()));
            (
                x.clone() as Arc<dyn DeliveryClient>,
                x as Arc<dyn TimelineReader>,
            )
        };

    Ok(UnitDeps {
        schedule: config.schedule.clone(),
        generator,
        delivery,
        timeline,
        target_accounts_path: config.agent.target_accounts_path(),
    })
}

/// Run the agent until SIGINT or SIGTERM.
///
/// Startup failures are returned before the tick loop begins; by then the
/// manager has already released the heartbeat.
pub async fn run_agent(config: Config) -> Result<TickStats> {
    let deps = build_unit_deps(&config)?;
    let factory = DefaultUnitFactory::new(deps);

    let mut manager = CoreManager::new(
        HeartbeatConfig::default().with_path(config.agent.heartbeat_path.clone()),
    );
    manager
        .startup(&config.agent.registry_path, &factory)
        .await?;
    tracing::info!(
        "Agent started with {} core(s): {}",
        manager.active_count(),
        manager.unit_names().join(", ")
    );

    let (stop, signal) = stop_channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing current tick");
        stop.stop();
    });

    let stats = TickScheduler::new(config.schedule.tick_interval)
        .run(&mut manager, signal)
        .await;
    tracing::info!(
        "Agent stopped after {} ticks ({} overruns)",
        stats.ticks,
        stats.overruns
    );
    Ok(stats)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
