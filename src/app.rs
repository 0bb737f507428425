//! The application assembly, decoupled from the entry point.

use crate::{
    api::{routes, Api},
    cli::Cli,
    config::Config,
    reload::{spawn_file_watcher, Reloader},
    state::StateHolder,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    local_addr: SocketAddr,
    holder: Arc<StateHolder>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(cli: Cli) -> AppBuilder {
        AppBuilder::new(cli)
    }

    /// The address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &Arc<StateHolder> {
        &self.holder
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        // A dropped sender also means shutdown.
        let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await;
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the application.
pub struct AppBuilder {
    cli: Cli,
    metrics: Option<PrometheusHandle>,
    reload_notifier: Option<mpsc::Sender<u64>>,
    watch_files: bool,
}

impl AppBuilder {
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            metrics: None,
            reload_notifier: None,
            watch_files: true,
        }
    }

    /// Serves `GET /metrics` from `handle`.
    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Receives the generation number of every reload the file watcher publishes.
    pub fn reload_notifier(mut self, tx: mpsc::Sender<u64>) -> Self {
        self.reload_notifier = Some(tx);
        self
    }

    /// Disables the config/template file watcher.
    pub fn watch_files(mut self, enabled: bool) -> Self {
        self.watch_files = enabled;
        self
    }

    /// Loads the first configuration generation, binds the listener and
    /// spawns the server and reload tasks.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let holder = Arc::new(StateHolder::new().context("failed to initialize state")?);
        let reloader = Arc::new(Reloader::new(self.cli.clone(), holder.clone()));

        reloader
            .reload()
            .await
            .context("failed to load initial configuration")?;
        let config = holder.snapshot().config.clone();
        log_config(&config);

        let listener = TcpListener::bind(config.listen_address)
            .await
            .with_context(|| format!("failed to bind {}", config.listen_address))?;
        let local_addr = listener.local_addr()?;

        let mut api = Api::new(holder.clone()).with_reloader(reloader.clone());
        if let Some(handle) = self.metrics {
            api = api.with_metrics(handle);
        }
        let router = routes(api);

        let task_manager = TaskManager::new(shutdown_rx.clone());

        let mut server_shutdown_rx = shutdown_rx.clone();
        task_manager.spawn("HttpServer", async move {
            let shutdown = async move {
                let _ = server_shutdown_rx.wait_for(|shutdown| *shutdown).await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
        });

        if self.watch_files {
            task_manager.track(
                "FileWatcher",
                spawn_file_watcher(reloader.clone(), shutdown_rx.clone(), self.reload_notifier),
            );
        }

        #[cfg(unix)]
        task_manager.track(
            "SignalHandler",
            crate::reload::spawn_signal_handler(reloader, shutdown_rx)?,
        );

        info!(address = %local_addr, "Listening for Alertmanager webhooks");
        Ok(App {
            task_manager,
            local_addr,
            holder,
        })
    }
}

fn log_config(config: &Config) {
    info!("-------------------- Configuration --------------------");
    info!("Listen Address: {}", config.listen_address);
    info!("Log Level: {}", config.log_level);
    info!(
        "Lifecycle API: {}",
        if config.enable_lifecycle { "Enabled" } else { "Disabled" }
    );
    info!("Outbound Timeout: {}s", config.timeout_seconds);
    info!("Max Message Size: {} bytes", config.max_message_bytes);
    info!("Template Files: {}", config.templates.len());
    let mut names: Vec<&str> = config.targets.keys().map(String::as_str).collect();
    names.sort_unstable();
    info!("Targets: {}", names.join(", "));
    match config.fanout.url.as_deref() {
        Some(url) => info!("Third API: {} (source: {})", url, config.fanout.source),
        None => info!("Third API: Disabled"),
    }
    info!("-------------------------------------------------------");
}
