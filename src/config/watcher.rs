//! Hot reload of the configuration file.
//!
//! The file's directory is watched rather than the file, so a save that
//! writes a new file and renames it over the old one is still seen. A
//! reload that parses to the configuration already in effect is dropped.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServerConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Sends a fresh [`ServerConfig`] whenever the file's content changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ServerConfig,
    update_tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Watch `path`, starting from `current`, the configuration in effect.
    pub fn new(path: &Path, current: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Updates flow for as long as the returned watcher lives.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(OsStr::to_os_string);
        let file = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, file_name.as_deref()) => {
                    reload(&file, &mut current, &update_tx);
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Watching configuration file");
        Ok(watcher)
    }
}

/// True if `event` may have changed the content of the watched file.
fn touches(event: &Event, file_name: Option<&OsStr>) -> bool {
    let content = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    );
    content && event.paths.iter().any(|p| p.file_name() == file_name)
}

/// Load the file and pass it on if it differs from `current`.
///
/// Returns true if an update was sent.
fn reload(path: &Path, current: &mut ServerConfig, updates: &mpsc::UnboundedSender<ServerConfig>) -> bool {
    let next = match load_config(path) {
        Ok(next) => next,
        Err(err) => {
            tracing::error!(
                path = %path.display(),
                error = %err,
                "Failed to reload config, keeping the current configuration"
            );
            return false;
        }
    };

    let sections = changed_sections(current, &next);
    if sections.is_empty() {
        tracing::debug!(path = %path.display(), "Config file saved without changes");
        return false;
    }

    tracing::info!(path = %path.display(), sections = ?sections, "Config file changed");
    *current = next.clone();
    updates.send(next).is_ok()
}

/// Top-level sections (`port`, `proxy`, `modules`, ...) that differ.
pub fn changed_sections(old: &ServerConfig, new: &ServerConfig) -> Vec<String> {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(old), serde_json::to_value(new))
    else {
        return vec!["*".to_owned()];
    };

    old.keys()
        .chain(new.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect()
}
