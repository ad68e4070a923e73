//! Reloads the space configuration when the file is edited on disk.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tracing::{debug, info_span, warn};

use crate::model::ConfigStore;

pub const DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches the directory containing the configuration file. Dropping the
/// watcher stops it.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl ConfigWatcher {
    pub fn spawn(store: Arc<ConfigStore>, path: PathBuf) -> notify::Result<ConfigWatcher> {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(notify::Error::io)?;
        let Some(file_name) = path.file_name().map(OsString::from) else {
            return Err(notify::Error::generic("configuration path has no file name"));
        };

        let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| {
            let _s = info_span!("config_watcher").entered();
            match result {
                Ok(events) => {
                    if events.iter().any(|event| event.path.file_name() == Some(&file_name)) {
                        reload(&store, &path);
                    }
                }
                Err(err) => warn!(%err, "Configuration watch error"),
            }
        })?;
        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "Watching configuration directory");
        Ok(ConfigWatcher { _debouncer: debouncer })
    }
}

fn reload(store: &ConfigStore, path: &Path) {
    if !path.exists() {
        debug!(path = %path.display(), "Configuration file removed; keeping current state");
        return;
    }
    if let Err(err) = store.refresh(path) {
        warn!(path = %path.display(), %err, "Ignoring unreadable configuration");
    }
}
