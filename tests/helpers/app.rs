//! Test helpers for running the full application over a real socket.

use anyhow::Result;
use dingrelay::{app::App, cli::Cli, state::StateHolder};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::timeout,
};

/// A running instance of the application.
pub struct TestApp {
    pub config_path: PathBuf,
    pub reload_rx: mpsc::Receiver<u64>,
    shutdown_tx: watch::Sender<bool>,
    app_handle: Option<JoinHandle<Result<()>>>,
    addr: SocketAddr,
    holder: Arc<StateHolder>,
    // Keeps the config directory alive for the test run.
    _dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn state(&self) -> &Arc<StateHolder> {
        &self.holder
    }

    pub fn dir(&self) -> &std::path::Path {
        self._dir.path()
    }

    /// Shuts down the application and waits for it to terminate.
    pub async fn shutdown(mut self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;

        if let Some(handle) = self.app_handle.take() {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// Writes a config file into a fresh directory and starts the app on it.
pub struct TestAppBuilder {
    config: String,
    enable_lifecycle: bool,
    metrics: Option<PrometheusHandle>,
}

impl TestAppBuilder {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            enable_lifecycle: false,
            metrics: None,
        }
    }

    pub fn enable_lifecycle(mut self) -> Self {
        self.enable_lifecycle = true;
        self
    }

    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub async fn start(self) -> Result<TestApp> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.toml");
        tokio::fs::write(&config_path, &self.config).await?;

        let cli = Cli {
            config: Some(config_path.clone()),
            listen_address: Some("127.0.0.1:0".parse()?),
            log_level: None,
            enable_lifecycle: self.enable_lifecycle,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reload_tx, reload_rx) = mpsc::channel(16);
        let mut builder = App::builder(cli).reload_notifier(reload_tx);
        if let Some(handle) = self.metrics {
            builder = builder.metrics(handle);
        }
        let app = builder.build(shutdown_rx).await?;

        let addr = app.local_addr();
        let holder = app.state().clone();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            config_path,
            reload_rx,
            shutdown_tx,
            app_handle: Some(app_handle),
            addr,
            holder,
            _dir: dir,
        })
    }
}
