//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file so editors that
//! save by rename are still seen. Bursts of events are coalesced into one
//! reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RelayNodeConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches one config file and emits every valid new version of it.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<RelayNodeConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configs.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayNodeConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a Tokio runtime; the returned
    /// handle stops the watch when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, file_name.as_deref()) => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default(),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let Self {
            path,
            debounce,
            update_tx,
        } = self;
        tokio::spawn(async move {
            while event_rx.recv().await.is_some() {
                tokio::time::sleep(debounce).await;
                while event_rx.try_recv().is_ok() {}

                tracing::info!(path = ?path, "Config file change detected, reloading");
                match load_config(&path) {
                    Ok(config) => {
                        if update_tx.send(config).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(
                        error = %e,
                        "Failed to reload config, keeping current configuration"
                    ),
                }
            }
        });

        Ok(watcher)
    }
}

fn is_relevant(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return false;
    }
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}
