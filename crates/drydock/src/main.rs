//! drydock daemon
//!
//! Runs the reconciliation and promotion engine on an in-memory store until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use drydock_core::{BroadcastPublisher, Engine, EnginePlugins};
use drydock_store::MemoryStore;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, LogFormat};

#[derive(Parser)]
#[command(name = "drydock")]
#[command(about = "Continuous delivery reconciliation daemon", long_about = None)]
struct Cli {
    /// Config file, overriding DRYDOCK_CONFIG and the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(daemon: &config::DaemonConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&daemon.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match daemon.log_format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn log_events(mut events: broadcast::Receiver<drydock_api::DeliveryEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => debug!(event = event.name(), resource = ?event.resource_id(), "event"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event log lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = Config::load_default(cli.config.as_deref())?;
    init_tracing(&config.daemon);
    info!(version = env!("CARGO_PKG_VERSION"), "drydock starting");

    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(BroadcastPublisher::default());
    tokio::spawn(log_events(publisher.subscribe()));

    let engine = Engine::new(
        config.engine.clone(),
        store,
        publisher,
        EnginePlugins::default(),
    )?;

    for path in &config.delivery_configs {
        let submitted = config::load_delivery_config(path)?;
        match engine.persister.upsert(&submitted).await {
            Ok(stored) => info!(
                config = %stored.name,
                application = %stored.application,
                resources = stored.resources().count(),
                "loaded delivery config"
            ),
            Err(e) => error!(path = %path.display(), error = %e, "rejected delivery config"),
        }
    }

    let scheduler = engine.start_scheduler();
    // startup is complete, which is the application-up signal
    scheduler.application_up();

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.shutdown().await;

    Ok(())
}
