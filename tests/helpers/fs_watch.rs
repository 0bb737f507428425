//! File system watching test helpers.
//!
//! Event delivery latency differs between inotify, FSEvents and
//! ReadDirectoryChangesW, so the timeouts are picked per platform.

use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc;

pub struct PlatformTimeouts {
    /// Time for the watcher to register its directories after startup.
    pub watcher_setup: Duration,
    /// Upper bound for a reload notification after a write.
    pub reload_notification_timeout: Duration,
}

impl PlatformTimeouts {
    pub fn for_current_platform() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self {
                watcher_setup: Duration::from_millis(100),
                reload_notification_timeout: Duration::from_secs(5),
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            Self {
                watcher_setup: Duration::from_millis(500),
                reload_notification_timeout: Duration::from_secs(10),
            }
        }
    }
}

/// Rewrites `path` and flushes it to disk so the watcher sees a modify event.
pub async fn write_and_sync<P: AsRef<Path>>(path: P, content: &str) -> anyhow::Result<()> {
    let path = path.as_ref();
    fs::write(path, content).await?;
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    file.sync_all().await?;
    Ok(())
}

/// Waits for the next generation published by the file watcher.
pub async fn wait_for_reload_notification(
    receiver: &mut mpsc::Receiver<u64>,
    timeouts: &PlatformTimeouts,
) -> Result<u64, &'static str> {
    match tokio::time::timeout(timeouts.reload_notification_timeout, receiver.recv()).await {
        Ok(Some(generation)) => Ok(generation),
        Ok(None) => Err("Notification channel was closed"),
        Err(_) => Err("Timeout waiting for reload notification"),
    }
}
