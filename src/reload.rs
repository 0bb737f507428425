//! Configuration reloading.
//!
//! The [`Reloader`] turns the files on disk into a new [`ConfigState`] and
//! publishes it. Three things can trigger it: a change to the config file or a
//! template file ([`spawn_file_watcher`]), `SIGHUP` ([`spawn_signal_handler`]),
//! and `POST /-/reload`. A failed reload leaves the current generation in place.

use crate::cli::Cli;
use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::state::{ConfigState, StateHolder};
use anyhow::{Context, Result};
use notify::{
    event::EventKind, Config as WatcherConfig, Event, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Editors often write a file in several steps; wait for them to settle.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Rebuilds and publishes configuration generations.
pub struct Reloader {
    cli: Cli,
    holder: Arc<StateHolder>,
    lock: Mutex<()>,
}

impl Reloader {
    pub fn new(cli: Cli, holder: Arc<StateHolder>) -> Self {
        Self {
            cli,
            holder,
            lock: Mutex::new(()),
        }
    }

    /// Loads config and templates from disk and publishes them.
    ///
    /// Returns the new generation number.
    pub async fn reload(&self) -> Result<u64> {
        let _guard = self.lock.lock().await;

        let config = Config::load(&self.cli).context("failed to load configuration")?;
        let state = ConfigState::build(config)
            .await
            .context("failed to build configuration state")?;
        Ok(self.holder.update(state))
    }

    pub fn holder(&self) -> &Arc<StateHolder> {
        &self.holder
    }

    /// The config file plus the template files of the current generation.
    pub fn watched_files(&self) -> HashSet<PathBuf> {
        let config_path = self
            .cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        std::iter::once(config_path)
            .chain(self.holder.snapshot().config.templates.iter().cloned())
            .map(|path| absolute(&path))
            .collect()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Watches the config and template files and reloads when one changes.
///
/// `reload_notifier`, when given, receives each newly published generation.
pub fn spawn_file_watcher(
    reloader: Arc<Reloader>,
    shutdown_rx: watch::Receiver<bool>,
    reload_notifier: Option<mpsc::Sender<u64>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_file_watcher(reloader, shutdown_rx, reload_notifier).await {
            error!("File watcher error: {:#}", e);
        }
    })
}

async fn run_file_watcher(
    reloader: Arc<Reloader>,
    mut shutdown_rx: watch::Receiver<bool>,
    reload_notifier: Option<mpsc::Sender<u64>>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(100);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if let Err(e) = tx.blocking_send(event) {
                    error!("Failed to send file event: {}", e);
                }
            }
        },
        WatcherConfig::default(),
    )?;

    let mut watched_dirs = HashSet::new();
    watch_parents(&mut watcher, &mut watched_dirs, &reloader.watched_files());

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!("File watcher received shutdown signal.");
                break;
            }
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let watched_files = reloader.watched_files();
        if !should_reload(&event, &watched_files) {
            continue;
        }

        info!("Configuration change detected, reloading...");
        tokio::time::sleep(SETTLE_DELAY).await;
        while rx.try_recv().is_ok() {}

        match reloader.reload().await {
            Ok(generation) => {
                // A new generation may list template files in new directories.
                watch_parents(&mut watcher, &mut watched_dirs, &reloader.watched_files());
                if let Some(notifier) = &reload_notifier {
                    if notifier.send(generation).await.is_err() {
                        warn!("Reload notifier channel closed");
                    }
                }
            }
            Err(e) => error!("Failed to reload configuration, keeping the current one: {:#}", e),
        }
    }

    Ok(())
}

fn watch_parents(
    watcher: &mut RecommendedWatcher,
    watched_dirs: &mut HashSet<PathBuf>,
    files: &HashSet<PathBuf>,
) {
    for file in files {
        let Some(parent) = file.parent() else { continue };
        if watched_dirs.contains(parent) {
            continue;
        }
        match watcher.watch(parent, RecursiveMode::NonRecursive) {
            Ok(()) => {
                info!("Watching for changes in {:?}", parent);
                watched_dirs.insert(parent.to_path_buf());
            }
            Err(e) => warn!("Cannot watch {:?}: {}", parent, e),
        }
    }
}

/// Determines if a file event should trigger a reload
fn should_reload(event: &Event, watched_files: &HashSet<PathBuf>) -> bool {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => event
            .paths
            .iter()
            .any(|path| watched_files.contains(path) || watched_files.contains(&absolute(path))),
        _ => false,
    }
}

/// Reloads on every `SIGHUP` until shutdown.
#[cfg(unix)]
pub fn spawn_signal_handler(
    reloader: Arc<Reloader>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!("Received SIGHUP, reloading configuration...");
                    if let Err(e) = reloader.reload().await {
                        error!("Failed to reload configuration, keeping the current one: {:#}", e);
                    }
                }
            }
        }
    }))
}
