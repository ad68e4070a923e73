//! Persisted mapping of spaces to the desired toggle state.
//!
//! Observers are notified from a small worker pool, never from the thread
//! that mutated the store, so a handler may call back into the store freely.
//! Deliveries are not ordered with respect to each other; every bulk
//! snapshot is complete on its own.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::SpaceId;
use crate::common::collections::BTreeSet;

const NOTIFY_WORKERS: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(#[from] io::Error),
    #[error("config file malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    /// One space changed.
    Space { id: SpaceId, enabled: bool },
    /// The full enabled set.
    Bulk(BTreeSet<SpaceId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(ConfigEvent) + Send + Sync>;
type Job = Box<dyn FnOnce() + Send>;

#[derive(Deserialize)]
struct ConfigFileIn {
    #[serde(rename = "enabledSpaces")]
    enabled_spaces: Vec<Value>,
}

#[derive(Serialize)]
struct ConfigFileOut {
    #[serde(rename = "enabledSpaces")]
    enabled_spaces: Vec<String>,
}

struct Inner {
    enabled: BTreeSet<SpaceId>,
    /// What the file on disk holds, as far as this store last read or wrote it.
    persisted: Option<BTreeSet<SpaceId>>,
    observers: Vec<(SubscriptionToken, Handler)>,
    next_token: u64,
}

pub struct ConfigStore {
    inner: Mutex<Inner>,
    /// Serializes file reads against writes.
    file: Mutex<()>,
    pool: NotifyPool,
}

impl ConfigStore {
    pub fn new() -> ConfigStore {
        ConfigStore {
            inner: Mutex::new(Inner {
                enabled: BTreeSet::new(),
                persisted: None,
                observers: Vec::new(),
                next_token: 0,
            }),
            file: Mutex::new(()),
            pool: NotifyPool::new(NOTIFY_WORKERS),
        }
    }

    /// Replaces the enabled set with the contents of `path`. On failure the
    /// current state is kept.
    pub fn load(&self, path: &Path) -> Result<usize, ConfigError> {
        let _file = self.file.lock();
        let enabled = read_config(path)?;
        let count = enabled.len();
        let mut inner = self.inner.lock();
        inner.enabled = enabled.clone();
        inner.persisted = Some(enabled);
        info!(path = %path.display(), count, "Loaded space configuration");
        self.notify(inner, None);
        Ok(count)
    }

    /// Like [`ConfigStore::load`], but ignores file contents this store
    /// already knows about, such as the echo of its own last save. Changes
    /// made in memory and not yet saved survive such a refresh. Returns
    /// whether the enabled set was replaced.
    pub fn refresh(&self, path: &Path) -> Result<bool, ConfigError> {
        let _file = self.file.lock();
        let enabled = read_config(path)?;
        let mut inner = self.inner.lock();
        if inner.persisted.as_ref() == Some(&enabled) {
            trace!(path = %path.display(), "Configuration file unchanged");
            return Ok(false);
        }
        info!(path = %path.display(), count = enabled.len(), "Reloaded space configuration");
        inner.enabled = enabled.clone();
        inner.persisted = Some(enabled);
        self.notify(inner, None);
        Ok(true)
    }

    /// Writes the enabled set to `path` via a temporary file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let _file = self.file.lock();
        let enabled = self.enabled_spaces();
        let file = ConfigFileOut {
            enabled_spaces: enabled.iter().map(SpaceId::to_string).collect(),
        };
        let buf = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, buf)?;
        fs::rename(&tmp, path)?;
        self.inner.lock().persisted = Some(enabled);
        trace!(path = %path.display(), "Saved space configuration");
        Ok(())
    }

    pub fn is_enabled(&self, id: SpaceId) -> bool { self.inner.lock().enabled.contains(&id) }

    pub fn enabled_spaces(&self) -> BTreeSet<SpaceId> { self.inner.lock().enabled.clone() }

    /// Flips `id` and returns its new state.
    pub fn toggle(&self, id: SpaceId) -> bool {
        let mut inner = self.inner.lock();
        let enabled = if inner.enabled.remove(&id) {
            false
        } else {
            inner.enabled.insert(id);
            true
        };
        debug!(?id, enabled, "Toggled space");
        self.notify(inner, Some((id, enabled)));
        enabled
    }

    /// Returns whether anything changed.
    pub fn set(&self, id: SpaceId, enabled: bool) -> bool {
        let mut inner = self.inner.lock();
        let changed = if enabled {
            inner.enabled.insert(id)
        } else {
            inner.enabled.remove(&id)
        };
        if changed {
            debug!(?id, enabled, "Set space");
            self.notify(inner, Some((id, enabled)));
        }
        changed
    }

    pub fn set_all(&self, spaces: impl IntoIterator<Item = SpaceId>) -> bool {
        let spaces: BTreeSet<SpaceId> = spaces.into_iter().collect();
        let mut inner = self.inner.lock();
        if inner.enabled == spaces {
            return false;
        }
        inner.enabled = spaces;
        self.notify(inner, None);
        true
    }

    pub fn remove_all(&self, ids: &[SpaceId]) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.enabled.len();
        inner.enabled.retain(|id| !ids.contains(id));
        if inner.enabled.len() == before {
            return false;
        }
        debug!(?ids, "Pruned removed spaces");
        self.notify(inner, None);
        true
    }

    /// Registers `handler` and immediately calls it, on this thread, with
    /// the enabled set as of registration.
    pub fn subscribe(
        &self,
        handler: impl Fn(ConfigEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        let handler: Handler = Arc::new(handler);
        let (token, snapshot) = {
            let mut inner = self.inner.lock();
            let token = SubscriptionToken(inner.next_token);
            inner.next_token += 1;
            inner.observers.push((token, handler.clone()));
            (token, inner.enabled.clone())
        };
        handler(ConfigEvent::Bulk(snapshot));
        token
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.inner.lock().observers.retain(|(t, _)| *t != token);
    }

    fn notify(&self, inner: parking_lot::MutexGuard<'_, Inner>, point: Option<(SpaceId, bool)>) {
        let event = match point {
            Some((id, enabled)) => ConfigEvent::Space { id, enabled },
            None => ConfigEvent::Bulk(inner.enabled.clone()),
        };
        let observers: Vec<Handler> = inner.observers.iter().map(|(_, h)| h.clone()).collect();
        drop(inner);
        for handler in observers {
            let event = event.clone();
            self.pool.dispatch(Box::new(move || handler(event)));
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self { Self::new() }
}

fn read_config(path: &Path) -> Result<BTreeSet<SpaceId>, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

/// Parses `{"enabledSpaces": [..]}`. Entries that are not ids are dropped.
pub fn parse_config(buf: &str) -> Result<BTreeSet<SpaceId>, ConfigError> {
    let file: ConfigFileIn = serde_json::from_str(buf)?;
    Ok(file
        .enabled_spaces
        .iter()
        .filter_map(|entry| {
            let id = match entry {
                Value::String(s) => s.parse::<SpaceId>().ok(),
                Value::Number(n) => n.as_u64().map(SpaceId::new),
                _ => None,
            };
            if id.is_none() {
                trace!(?entry, "Dropping unparseable space entry");
            }
            id
        })
        .collect())
}

struct NotifyPool {
    jobs: Sender<Job>,
}

impl NotifyPool {
    fn new(workers: usize) -> NotifyPool {
        let (jobs, rx) = unbounded::<Job>();
        for i in 0..workers.max(1) {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("config-notify-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                });
            if let Err(err) = spawned {
                warn!(%err, "Failed to spawn config notification worker");
            }
        }
        NotifyPool { jobs }
    }

    fn dispatch(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            warn!("Config notification workers are gone; dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn ids(raw: &[u64]) -> BTreeSet<SpaceId> { raw.iter().copied().map(SpaceId::new).collect() }

    fn recording(store: &ConfigStore) -> mpsc::Receiver<ConfigEvent> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        store.subscribe(move |event| {
            let _ = tx.lock().send(event);
        });
        rx
    }

    fn next(rx: &mpsc::Receiver<ConfigEvent>) -> ConfigEvent {
        rx.recv_timeout(Duration::from_secs(2)).expect("notification")
    }

    fn quiet(rx: &mpsc::Receiver<ConfigEvent>) -> bool {
        rx.recv_timeout(Duration::from_millis(100)).is_err()
    }

    #[test]
    fn subscribe_delivers_snapshot_before_returning() {
        let store = ConfigStore::new();
        store.set(SpaceId::new(3), true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |event| sink.lock().push(event));
        assert_eq!(seen.lock().first(), Some(&ConfigEvent::Bulk(ids(&[3]))));
    }

    #[test]
    fn set_and_toggle_round_trip() {
        let store = ConfigStore::new();
        let id = SpaceId::new(11);
        assert!(!store.is_enabled(id));
        store.set(id, true);
        assert!(store.is_enabled(id));
        assert!(!store.toggle(id));
        assert!(store.toggle(id));
        assert!(store.is_enabled(id));
    }

    #[test]
    fn redundant_set_does_not_notify() {
        let store = ConfigStore::new();
        let rx = recording(&store);
        assert_eq!(next(&rx), ConfigEvent::Bulk(ids(&[])));

        assert!(store.set(SpaceId::new(4), true));
        assert_eq!(next(&rx), ConfigEvent::Space { id: SpaceId::new(4), enabled: true });
        assert!(!store.set(SpaceId::new(4), true));
        assert!(!store.set_all(ids(&[4])));
        assert!(!store.remove_all(&[SpaceId::new(99)]));
        assert!(quiet(&rx));
    }

    #[test]
    fn set_all_with_new_set_notifies_bulk() {
        let store = ConfigStore::new();
        store.set(SpaceId::new(4), true);
        let rx = recording(&store);
        assert_eq!(next(&rx), ConfigEvent::Bulk(ids(&[4])));

        assert!(store.set_all(ids(&[6, 2])));
        assert_eq!(next(&rx), ConfigEvent::Bulk(ids(&[2, 6])));
        assert_eq!(store.enabled_spaces(), ids(&[2, 6]));
        assert!(quiet(&rx));
    }

    #[test]
    fn toggle_always_notifies() {
        let store = ConfigStore::new();
        let rx = recording(&store);
        next(&rx);
        store.toggle(SpaceId::new(2));
        store.toggle(SpaceId::new(2));
        let mut events = vec![next(&rx), next(&rx)];
        events.sort_by_key(|e| matches!(e, ConfigEvent::Space { enabled: true, .. }));
        assert_eq!(events, vec![
            ConfigEvent::Space { id: SpaceId::new(2), enabled: false },
            ConfigEvent::Space { id: SpaceId::new(2), enabled: true },
        ]);
    }

    #[test]
    fn remove_all_sends_bulk_snapshot() {
        let store = ConfigStore::new();
        store.set_all(ids(&[1, 9]));
        let rx = recording(&store);
        next(&rx);
        assert!(store.remove_all(&[SpaceId::new(9), SpaceId::new(5)]));
        assert_eq!(next(&rx), ConfigEvent::Bulk(ids(&[1])));
        assert_eq!(store.enabled_spaces(), ids(&[1]));
    }

    #[test]
    fn unsubscribed_handlers_hear_nothing() {
        let store = ConfigStore::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let token = store.subscribe(move |event| {
            let _ = tx.lock().send(event);
        });
        next(&rx);
        store.unsubscribe(token);
        store.toggle(SpaceId::new(1));
        assert!(quiet(&rx));
    }

    #[test]
    fn handlers_may_reenter_the_store() {
        let store = Arc::new(ConfigStore::new());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let inner = store.clone();
        store.subscribe(move |_| {
            let _ = tx.lock().send(inner.enabled_spaces());
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        store.set(SpaceId::new(8), true);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), ids(&[8]));
    }

    #[test]
    fn load_parses_and_drops_bad_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spaces.json");
        fs::write(&path, r#"{"enabledSpaces":["5","7","abc",12,-3,null]}"#).unwrap();

        let store = ConfigStore::new();
        let rx = recording(&store);
        next(&rx);
        assert_eq!(store.load(&path).unwrap(), 3);
        assert_eq!(store.enabled_spaces(), ids(&[5, 7, 12]));
        assert_eq!(next(&rx), ConfigEvent::Bulk(ids(&[5, 7, 12])));
    }

    #[test]
    fn failed_load_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spaces.json");
        let store = ConfigStore::new();
        store.set(SpaceId::new(1), true);

        assert!(matches!(store.load(&path), Err(ConfigError::Io(_))));
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(store.load(&path), Err(ConfigError::Malformed(_))));
        fs::write(&path, r#"{"other":[]}"#).unwrap();
        assert!(store.load(&path).is_err());
        assert_eq!(store.enabled_spaces(), ids(&[1]));
    }

    #[test]
    fn save_then_load_restores_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("spaces.json");
        let store = ConfigStore::new();
        store.set_all(ids(&[42, 3]));
        store.save(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"42\""));

        let restored = ConfigStore::new();
        restored.load(&path).unwrap();
        assert_eq!(restored.enabled_spaces(), ids(&[3, 42]));
    }

    #[test]
    fn refresh_keeps_unsaved_changes_over_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spaces.json");
        let store = ConfigStore::new();
        store.set(SpaceId::new(1), true);
        store.save(&path).unwrap();

        // Toggled in memory, save still pending.
        store.toggle(SpaceId::new(2));
        assert!(!store.refresh(&path).unwrap());
        assert_eq!(store.enabled_spaces(), ids(&[1, 2]));

        store.save(&path).unwrap();
        assert!(!store.refresh(&path).unwrap());
        assert_eq!(store.enabled_spaces(), ids(&[1, 2]));
    }

    #[test]
    fn refresh_applies_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spaces.json");
        let store = ConfigStore::new();
        store.set(SpaceId::new(1), true);
        store.save(&path).unwrap();
        let rx = recording(&store);
        next(&rx);

        fs::write(&path, r#"{"enabledSpaces":["9"]}"#).unwrap();
        assert!(store.refresh(&path).unwrap());
        assert_eq!(store.enabled_spaces(), ids(&[9]));
        assert_eq!(next(&rx), ConfigEvent::Bulk(ids(&[9])));

        // Editing back to an earlier state is still an edit.
        fs::write(&path, r#"{"enabledSpaces":["1"]}"#).unwrap();
        assert!(store.refresh(&path).unwrap());
        assert_eq!(store.enabled_spaces(), ids(&[1]));
    }

    #[test]
    fn refresh_of_unknown_file_applies_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spaces.json");
        fs::write(&path, r#"{"enabledSpaces":[]}"#).unwrap();
        let store = ConfigStore::new();
        assert!(store.refresh(&path).unwrap());
        assert!(!store.refresh(&path).unwrap());
    }
}
