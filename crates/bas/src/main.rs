//! BAS Engine
//!
//! Runs the HVAC control loop against a serial relay board.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bas::bas_runtime::ServiceManager;
use bas::clock::SystemClock;
use bas::config::{Config, Overrides};
use bas::engine::{ControlLoop, EngineState};
use bas::link::SerialLink;

/// HVAC control engine
#[derive(Parser, Debug)]
#[command(name = "bas")]
#[command(about = "HVAC unit control engine", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./bas.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the relay board
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply(&Overrides {
        port: args.port,
        baud_rate: args.baud,
        json_logs: args.json_logs,
    });

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_tracing(config.log.json);

    info!("Starting BAS engine v{}", env!("CARGO_PKG_VERSION"));

    let service_manager = Arc::new(ServiceManager::new());

    let state = EngineState::seeded(config.control.history_capacity, config.control.audit_capacity);
    let link = Arc::new(SerialLink::serial(config.link_settings()));
    let control = ControlLoop::new(
        state,
        link,
        Arc::new(SystemClock),
        config.control_options(),
    );

    let engine = control.handle();
    service_manager
        .spawn(control)
        .context("Failed to start control loop")?;

    let snapshot = engine.get_state();
    info!(
        units = snapshot.units.len(),
        schedules = snapshot.schedules.len(),
        "Control loop running"
    );
    for (id, lifecycle) in service_manager.services() {
        debug!(service = %id, state = %lifecycle, "Service registered");
    }

    shutdown_signal(service_manager).await;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bas=info,bas_runtime=info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(service_manager: Arc<ServiceManager>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }

    info!("Shutting down services...");
    if let Err(e) = service_manager.shutdown_all().await {
        warn!("Some services did not shut down cleanly: {}", e);
    }
}
