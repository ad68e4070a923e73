use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::query::QueryRequest;
use super::{Event, Reactor, Receiver};
use crate::actor;
use crate::model::server::StatusSnapshot;
use crate::model::{ConfigStore, LayoutCache, SpaceId, SpaceOrder, SpaceResolver};
use crate::sys::testing::{FakeLayoutSource, FakeObserver, FakeSpaceSource, FakeToggle, ManualClock};

/// A reactor driven synchronously from the test thread.
pub struct Harness {
    pub reactor: Reactor,
    pub events: Receiver,
    pub store: Arc<ConfigStore>,
    pub toggle: Arc<FakeToggle>,
    pub primary: Arc<FakeSpaceSource>,
    pub observer: Arc<FakeObserver>,
    pub layout: Arc<FakeLayoutSource>,
}

impl Harness {
    pub fn new(layout: &[&[(u64, &str)]]) -> Harness {
        Self::with_store(layout, Arc::new(ConfigStore::new()), None)
    }

    pub fn with_store(
        layout: &[&[(u64, &str)]],
        store: Arc<ConfigStore>,
        config_path: Option<PathBuf>,
    ) -> Harness {
        let primary = FakeSpaceSource::unsupported();
        let observer = Arc::new(FakeObserver::default());
        let layout = FakeLayoutSource::with(layout);
        let cache = LayoutCache::new(layout.clone(), ManualClock::new(), Duration::from_secs(1));
        let resolver = SpaceResolver::new(primary.clone(), observer.clone(), cache).into_shared();
        let toggle = Arc::new(FakeToggle::default());

        let (events_tx, events) = actor::channel();
        let mut reactor = Reactor::new(resolver, store.clone(), toggle.clone(), config_path);
        reactor.start(events_tx);
        Harness {
            reactor,
            events,
            store,
            toggle,
            primary,
            observer,
            layout,
        }
    }

    /// Points the compositor query at `id` and reports the change.
    pub fn switch_to(&mut self, id: u64, order: SpaceOrder) {
        self.primary.set(Some(id));
        self.reactor.handle_event(Event::SpaceChanged {
            from: self.reactor.current.and_then(|(id, order)| order.map(|o| (id, o))),
            to: SpaceId::new(id),
            order,
        });
    }

    /// Feeds every queued event to the reactor.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((_, event)) = self.events.try_recv() {
            self.reactor.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn toggle_space(&mut self, id: u64) -> bool {
        self.query(|resp| QueryRequest::ToggleSpace { id: SpaceId::new(id), resp })
    }

    pub fn set_space(&mut self, id: u64, enabled: bool) -> bool {
        self.query(|resp| QueryRequest::SetSpace { id: SpaceId::new(id), enabled, resp })
    }

    pub fn status(&mut self) -> StatusSnapshot { self.query(QueryRequest::Status) }

    fn query<T>(&mut self, build: impl FnOnce(oneshot::Sender<T>) -> QueryRequest) -> T {
        let (tx, mut rx) = oneshot::channel();
        self.reactor.handle_event(Event::Query(build(tx)));
        rx.try_recv().expect("reactor replies before returning")
    }
}
