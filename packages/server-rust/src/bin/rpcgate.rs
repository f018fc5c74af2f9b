//! `rpcgate` server binary.

use anyhow::{Context, Result};
use clap::Parser;
use rpcgate_server::cli::Cli;
use rpcgate_server::network::NetworkModule;
use rpcgate_server::{telemetry, App};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    telemetry::initialise(&config.telemetry).context("failed to initialise logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        stats = config.stats.enabled,
        "starting rpcgate"
    );

    let app = App::build(&config);
    let mut sweeper = app.start_sweeper(&config.stats);

    let mut network = NetworkModule::new(config.network.clone(), app.dispatcher.clone());
    let port = network.start().await?;
    info!(port, tls = config.network.tls.is_some(), "rpcgate ready");

    let served = network.serve(shutdown_signal()).await;

    if let Some(sweeper) = sweeper.as_mut() {
        sweeper.stop().await;
    }
    info!("rpcgate stopped");
    served
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
