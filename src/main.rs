//! dingrelay - Alertmanager to DingTalk webhook relay.

use anyhow::Result;
use clap::Parser;
use dingrelay::{
    app::App,
    cli::Cli,
    config::Config,
    telemetry::{init_tracing, install_metrics},
};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layered: defaults, file, environment, then CLI flags.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        init_tracing("error");
        error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "dingrelay starting up...");

    let metrics = install_metrics()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(cli).metrics(metrics).build(shutdown_rx).await?;
    let app_handle = tokio::spawn(app.run());

    wait_for_termination().await?;
    info!("Shutdown signal received. Shutting down gracefully...");

    shutdown_tx.send(true)?;
    app_handle.await??;

    info!("Exiting.");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
