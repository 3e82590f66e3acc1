//! Configuration file watcher for hot reload.
//!
//! Editors and `notify` backends often report one save as several modify
//! events. Each event reloads the file, but a configuration is forwarded only
//! when it differs from the last one forwarded (or the one the process started
//! with), so the mount diff runs once per real change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::DispatchConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: DispatchConfig,
    update_tx: mpsc::UnboundedSender<DispatchConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver of validated, changed configurations.
    ///
    /// `current` is the configuration already applied; an identical reload is dropped.
    pub fn new(
        path: &Path,
        current: DispatchConfig,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. Events stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let mut last = self.current;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(changed) = reload_if_changed(&path, &mut last) {
                        let _ = tx.send(changed);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Reload `path`; return the new config only if it is valid and differs from `last`.
fn reload_if_changed(path: &Path, last: &mut DispatchConfig) -> Option<DispatchConfig> {
    match load_config(path) {
        Ok(config) if config == *last => {
            tracing::debug!(path = ?path, "Config file touched, contents unchanged");
            None
        }
        Ok(config) => {
            tracing::info!(path = ?path, mounts = config.mounts.len(), "Config changed, reloading");
            *last = config.clone();
            Some(config)
        }
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to reload config, keeping current mounts");
            None
        }
    }
}
