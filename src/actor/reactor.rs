//! The Reactor's job is to keep the preference coherent with whichever space
//! is showing.
//!
//! It takes events from the space monitor, the configuration store and IPC
//! clients, owns the current-space and last-applied state, and is the only
//! place that writes the preference. Everything runs on the reactor thread,
//! one event at a time.

mod query;

#[cfg(test)]
mod testing;


use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, instrument, trace, warn};

use crate::actor;
use crate::common::collections::BTreeSet;
use crate::model::{ConfigEvent, ConfigStore, SharedResolver, SpaceId, SpaceOrder, SubscriptionToken};
use crate::sys::defaults::Toggle;

pub use query::{QueryError, QueryRequest, ReactorQueryHandle};

pub type Sender = actor::Sender<Event>;
type Receiver = actor::Receiver<Event>;

#[derive(Debug)]
pub enum Event {
    /// The space monitor saw a different space, or a new order for the same
    /// one.
    SpaceChanged {
        from: Option<(SpaceId, SpaceOrder)>,
        to: SpaceId,
        order: SpaceOrder,
    },

    /// Spaces that dropped out of the canonical layout.
    SpacesRemoved(Vec<SpaceId>),

    /// Forwarded from the configuration store.
    ConfigChanged(ConfigEvent),

    Query(QueryRequest),
}

#[derive(Clone)]
pub struct ReactorHandle {
    sender: Sender,
    queries: ReactorQueryHandle,
}

impl ReactorHandle {
    fn new(sender: Sender) -> Self {
        let queries = ReactorQueryHandle::new(sender.clone());
        ReactorHandle { sender, queries }
    }

    pub fn sender(&self) -> Sender { self.sender.clone() }
}

impl std::ops::Deref for ReactorHandle {
    type Target = ReactorQueryHandle;

    fn deref(&self) -> &Self::Target { &self.queries }
}

pub struct Reactor {
    resolver: SharedResolver,
    store: Arc<ConfigStore>,
    toggle: Arc<dyn Toggle>,
    config_path: Option<PathBuf>,
    current: Option<(SpaceId, Option<SpaceOrder>)>,
    last_applied: Option<(SpaceId, bool)>,
    known_spaces: BTreeSet<SpaceId>,
    subscription: Option<SubscriptionToken>,
}

impl Reactor {
    pub fn spawn(
        resolver: SharedResolver,
        store: Arc<ConfigStore>,
        toggle: Arc<dyn Toggle>,
        config_path: Option<PathBuf>,
    ) -> std::io::Result<ReactorHandle> {
        let (events_tx, events) = actor::channel();
        let mut reactor = Reactor::new(resolver, store, toggle, config_path);
        reactor.start(events_tx.clone());
        thread::Builder::new().name("reactor".to_string()).spawn(move || {
            if let Err(err) = actor::run_local(reactor.run(events)) {
                error!(%err, "Reactor runtime failed");
            }
        })?;
        Ok(ReactorHandle::new(events_tx))
    }

    pub fn new(
        resolver: SharedResolver,
        store: Arc<ConfigStore>,
        toggle: Arc<dyn Toggle>,
        config_path: Option<PathBuf>,
    ) -> Reactor {
        Reactor {
            resolver,
            store,
            toggle,
            config_path,
            current: None,
            last_applied: None,
            known_spaces: BTreeSet::new(),
            subscription: None,
        }
    }

    /// Seeds the known spaces and subscribes to configuration changes.
    fn start(&mut self, events_tx: Sender) {
        let layout_ids = self.resolver.lock().ordered_space_ids(false).unwrap_or_default();
        self.known_spaces.extend(layout_ids);
        self.known_spaces.extend(self.store.enabled_spaces());
        debug!(known = ?self.known_spaces, "Seeded known spaces");

        let token = self
            .store
            .subscribe(move |event| events_tx.send(Event::ConfigChanged(event)));
        self.subscription = Some(token);
    }

    async fn run(mut self, mut events: Receiver) {
        while let Some((span, event)) = events.recv().await {
            let _guard = span.enter();
            self.handle_event(event);
        }
        if let Some(token) = self.subscription.take() {
            self.store.unsubscribe(token);
        }
        debug!("Reactor exiting");
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::SpaceChanged { from, to, order } => self.on_space_changed(from, to, order),
            Event::SpacesRemoved(ids) => self.on_spaces_removed(ids),
            Event::ConfigChanged(event) => self.on_config_changed(event),
            Event::Query(req) => self.handle_query_request(req),
        }
    }

    #[instrument(skip(self))]
    fn on_space_changed(&mut self, from: Option<(SpaceId, SpaceOrder)>, to: SpaceId, order: SpaceOrder) {
        if to.is_unknown() {
            warn!("Ignoring change to unknown space");
            return;
        }
        info!("Space changed");
        self.current = Some((to, Some(order)));
        self.known_spaces.insert(to);
        self.apply(to);
    }

    #[instrument(skip(self))]
    fn on_spaces_removed(&mut self, ids: Vec<SpaceId>) {
        for id in &ids {
            self.known_spaces.remove(id);
        }
        if self.store.remove_all(&ids) {
            info!("Dropped removed spaces from configuration");
            self.persist();
        }
    }

    fn on_config_changed(&mut self, event: ConfigEvent) {
        trace!(?event, "Configuration changed");
        self.apply_current();
    }

    fn apply_current(&mut self) {
        if let Some((id, _)) = self.current {
            self.apply(id);
        }
    }

    /// Writes the desired state for `id` unless it was the last thing
    /// written.
    fn apply(&mut self, id: SpaceId) {
        let desired = self.store.is_enabled(id);
        if self.last_applied == Some((id, desired)) {
            trace!(?id, desired, "Already applied");
            return;
        }
        match self.toggle.write(desired) {
            Ok(()) => {
                info!(?id, enabled = desired, "Applied preference");
                self.last_applied = Some((id, desired));
            }
            Err(err) => warn!(?id, %err, "Failed to apply preference"),
        }
    }

    fn persist(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(err) = self.store.save(path) {
            warn!(path = %path.display(), %err, "Failed to save space configuration");
        }
    }
}
