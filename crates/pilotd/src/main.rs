//! Pilot daemon - autonomous B2B prospecting pilot.
//!
//! Assembles the stores, the collaborator registry and the brain engine,
//! then runs the schedulers (brain cycle, light cycle, weekly reset) and
//! the control socket until ctrl-c.

use pilot_common::config::SystemConfig;
use pilot_common::llm::HttpReasoning;
use pilot_common::metrics::PilotMetrics;
use pilot_common::store::PilotStore;
use pilot_common::LeadStore;
use pilotd::brain::BrainEngine;
use pilotd::collaborators::{
    apollo::ApolloClient,
    fullenrich::FullEnrichClient,
    hubspot::HubspotClient,
    llm_skills::{LlmDrafter, LlmQualifier},
    mailer::JsonMailerStore,
    monitor::JsonMonitorStore,
    resend::ResendClient,
    web::HttpWebFetcher,
};
use pilotd::diagnostic::DiagnosticChecker;
use pilotd::executor::ActionExecutor;
use pilotd::handler::AutonomousHandler;
use pilotd::notifier::WebhookNotifier;
use pilotd::researcher::ProspectResearcher;
use pilotd::rpc_server::{cleanup_socket, start_server, DaemonHandle};
use pilotd::services::Services;

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("pilotd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = SystemConfig::load()?;
    let data_dir = config.effective_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    info!("Data directory: {}", data_dir.display());

    // Stores
    let store = Arc::new(Mutex::new(PilotStore::open(&data_dir)));
    let leads = Arc::new(Mutex::new(LeadStore::open(&data_dir)));

    // Collaborators
    let reasoning = Arc::new(HttpReasoning::new(config.reasoning.clone())?);
    if !reasoning.configured() {
        warn!("Reasoning API key missing - only fallback plans will run");
    }
    let services = Services {
        reasoning: reasoning.clone(),
        leads: Arc::new(ApolloClient::new()?),
        qualifier: Arc::new(LlmQualifier::new(reasoning.clone())),
        enrichment: Arc::new(FullEnrichClient::new(&data_dir, reasoning.clone())?),
        crm: Arc::new(HubspotClient::new()?),
        drafter: Arc::new(LlmDrafter::new(reasoning.clone())),
        sender: Arc::new(ResendClient::new()?),
        mailer: Arc::new(JsonMailerStore::open(&data_dir)),
        monitor: Arc::new(JsonMonitorStore::open(&data_dir)),
        improvement: None,
        notifier: Arc::new(WebhookNotifier::new(config.notify_webhook.clone())?),
        web: Arc::new(HttpWebFetcher::new()?),
    };

    // Components
    let metrics = Arc::new(PilotMetrics::default());
    let researcher =
        Arc::new(ProspectResearcher::new(store.clone(), leads.clone(), services.clone()));
    let executor = Arc::new(ActionExecutor::new(
        store.clone(),
        leads.clone(),
        services.clone(),
        researcher.clone(),
    ));
    let checker = Arc::new(DiagnosticChecker::new(
        store.clone(),
        leads.clone(),
        services.clone(),
        config.daily_api_budget,
    ));
    let brain = Arc::new(BrainEngine::new(
        store.clone(),
        leads.clone(),
        services.clone(),
        executor.clone(),
        checker.clone(),
        metrics.clone(),
        config.daily_api_budget,
    ));
    let handler = Arc::new(AutonomousHandler::new(
        store.clone(),
        leads.clone(),
        services.clone(),
        checker.clone(),
    ));

    let cycle_trigger = Arc::new(Notify::new());
    spawn_brain_scheduler(brain.clone(), store.clone(), cycle_trigger.clone());
    spawn_light_scheduler(brain.clone(), store.clone());
    spawn_weekly_scheduler(brain.clone(), store.clone());

    // Control socket
    let daemon = Arc::new(DaemonHandle {
        store: store.clone(),
        handler,
        checker,
        executor,
        metrics,
        cycle_trigger,
        start_time: Instant::now(),
    });
    let socket_path = config.socket_path();
    {
        let daemon = daemon.clone();
        let socket_path = socket_path.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(daemon, socket_path).await {
                error!("Control socket server failed: {}", e);
            }
        });
    }

    info!("pilotd running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");
    cleanup_socket(&socket_path);
    Ok(())
}

/// True when the pilot should act at all: enabled and context defined.
fn pilot_active(store: &Arc<Mutex<PilotStore>>) -> bool {
    let store = store.lock().unwrap();
    store.state().lifecycle() == pilot_common::state::Lifecycle::Active
}

fn brain_interval(store: &Arc<Mutex<PilotStore>>) -> Duration {
    Duration::from_secs(store.lock().unwrap().state().config.brain_schedule.brain_interval_secs)
}

fn light_interval(store: &Arc<Mutex<PilotStore>>) -> Duration {
    Duration::from_secs(store.lock().unwrap().state().config.brain_schedule.light_interval_secs)
}

/// Brain cycles on schedule, plus out-of-schedule runs when the trigger
/// fires (operator chat, pilotctl cycle). A failed cycle is logged and the
/// loop keeps going.
fn spawn_brain_scheduler(
    brain: Arc<BrainEngine>,
    store: Arc<Mutex<PilotStore>>,
    trigger: Arc<Notify>,
) {
    tokio::spawn(async move {
        loop {
            let forced = tokio::select! {
                _ = tokio::time::sleep(brain_interval(&store)) => false,
                _ = trigger.notified() => true,
            };

            if !forced && !pilot_active(&store) {
                continue;
            }
            if let Err(e) = brain.run_brain_cycle().await {
                error!("Brain cycle failed: {}", e);
            }
        }
    });
}

fn spawn_light_scheduler(brain: Arc<BrainEngine>, store: Arc<Mutex<PilotStore>>) {
    tokio::spawn(async move {
        // Offset from the brain cycle so the two interleave
        tokio::time::sleep(light_interval(&store) / 2).await;
        loop {
            if pilot_active(&store) {
                if let Err(e) = brain.run_light_cycle().await {
                    error!("Light cycle failed: {}", e);
                }
            }
            tokio::time::sleep(light_interval(&store)).await;
        }
    });
}

/// Hourly check for a week rollover; robust across restarts because it
/// compares against the persisted week start instead of counting ticks.
fn spawn_weekly_scheduler(brain: Arc<BrainEngine>, store: Arc<Mutex<PilotStore>>) {
    tokio::spawn(async move {
        loop {
            let rolled_over = {
                let store = store.lock().unwrap();
                store
                    .state()
                    .progress
                    .week_start
                    .map(|start| chrono::Utc::now() - start >= chrono::Duration::days(7))
                    .unwrap_or(false)
            };
            if rolled_over {
                if let Err(e) = brain.run_weekly_cycle().await {
                    error!("Weekly cycle failed: {}", e);
                }
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    });
}
