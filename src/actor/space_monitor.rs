//! Watches for space transitions.
//!
//! Push notifications (active space changed, application activated) and an
//! unconditional poll all funnel into the same reconciliation pass, so a
//! switch is noticed within one poll interval even if every notification is
//! lost. Application activations are coalesced and handled after a short
//! settle delay, since the compositor updates its bookkeeping slightly after
//! the activation is announced.

use std::thread;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, error, info, info_span, trace, warn};

use super::reactor::{self, Event};
use crate::actor;
use crate::common::collections::{BTreeMap, HashMap};
use crate::model::{SharedResolver, SpaceId, SpaceOrder, SpaceResolver, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ActiveSpaceChanged,
    AppActivated,
}

pub type Sender = actor::Sender<Trigger>;
type Receiver = actor::Receiver<Trigger>;

/// Passes an id may be absent from the layout before it is reported removed.
const REMOVAL_GRACE_PASSES: u32 = 1;

pub struct SpaceMonitor {
    resolver: SharedResolver,
    reactor_tx: reactor::Sender,
    poll_interval: Duration,
    settle_delay: Duration,
    current: Option<(SpaceId, SpaceOrder)>,
    canonical_orders: BTreeMap<SpaceId, SpaceOrder>,
    signature_orders: HashMap<String, SpaceOrder>,
    next_minted_order: SpaceOrder,
    missed_passes: HashMap<SpaceId, u32>,
}

impl SpaceMonitor {
    pub fn new(
        resolver: SharedResolver,
        reactor_tx: reactor::Sender,
        poll_interval: Duration,
        settle_delay: Duration,
    ) -> SpaceMonitor {
        SpaceMonitor {
            resolver,
            reactor_tx,
            poll_interval,
            settle_delay,
            current: None,
            canonical_orders: BTreeMap::new(),
            signature_orders: HashMap::default(),
            next_minted_order: 1,
            missed_passes: HashMap::default(),
        }
    }

    pub fn spawn(self) -> std::io::Result<Sender> {
        let (tx, rx) = actor::channel();
        thread::Builder::new().name("space-monitor".to_string()).spawn(move || {
            if let Err(err) = actor::run_local(self.run(rx)) {
                error!(%err, "Space monitor runtime failed");
            }
        })?;
        Ok(tx)
    }

    async fn run(mut self, mut triggers: Receiver) {
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut settle_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = poll.tick() => self.reconcile("poll"),

                _ = sleep_until(settle_at.unwrap_or_else(Instant::now)), if settle_at.is_some() => {
                    settle_at = None;
                    self.reconcile("app activated");
                }

                trigger = triggers.recv() => {
                    let Some((span, trigger)) = trigger else {
                        break;
                    };
                    let _guard = span.enter();
                    match trigger {
                        Trigger::ActiveSpaceChanged => self.reconcile("active space changed"),
                        Trigger::AppActivated => {
                            trace!("Deferring reconcile until activation settles");
                            settle_at.get_or_insert_with(|| Instant::now() + self.settle_delay);
                        }
                    }
                }
            }
        }
        debug!("Space monitor exiting");
    }

    /// One reconciliation pass. Emits at most one change and one removal
    /// event to the reactor.
    pub fn reconcile(&mut self, cause: &'static str) {
        let _s = info_span!("space_monitor::reconcile", cause).entered();
        let shared = self.resolver.clone();
        let mut resolver = shared.lock();

        if let Some(layout) = resolver.refresh_layout() {
            for (id, order) in layout.orders() {
                self.canonical_orders.insert(id, order);
            }
            if let Some(&highest) = self.canonical_orders.values().max() {
                self.next_minted_order = self.next_minted_order.max(highest + 1);
            }
            let removed = self.detect_removed(&resolver, |id| layout.contains(id));
            if !removed.is_empty() {
                info!(?removed, "Spaces removed");
                self.reactor_tx.send(Event::SpacesRemoved(removed));
            }
        }

        let resolution = resolver.resolve();
        drop(resolver);
        if resolution.id.is_unknown() {
            warn!("Unable to resolve current space");
            return;
        }
        let order = self.order_for(resolution.id, &resolution.tier);

        match self.current {
            Some((id, known_order)) if id == resolution.id && known_order == order => {
                trace!(?id, order, "No space change");
                return;
            }
            Some((id, known_order)) if id == resolution.id => {
                debug!(?id, from = known_order, to = order, "Space order changed");
            }
            previous => debug!(?previous, to = ?resolution.id, order, "Space changed"),
        }
        let from = self.current.replace((resolution.id, order));
        self.reactor_tx.send(Event::SpaceChanged { from, to: resolution.id, order });
    }

    fn order_for(&mut self, id: SpaceId, tier: &Tier) -> SpaceOrder {
        if let Some(&order) = self.canonical_orders.get(&id) {
            return order;
        }
        let key = match tier {
            Tier::Heuristic { signature } => signature.clone(),
            Tier::System => format!("system:{id}"),
        };
        if let Some(&order) = self.signature_orders.get(&key) {
            return order;
        }
        let order = self.next_minted_order;
        self.next_minted_order += 1;
        debug!(?id, order, "Minted order for space outside the canonical layout");
        self.signature_orders.insert(key, order);
        order
    }

    /// Forgets canonical spaces that have been missing from the layout for
    /// more than one pass and returns them.
    fn detect_removed(
        &mut self,
        resolver: &SpaceResolver,
        in_layout: impl Fn(SpaceId) -> bool,
    ) -> Vec<SpaceId> {
        let mut removed = Vec::new();
        for &id in self.canonical_orders.keys() {
            if in_layout(id) || resolver.is_heuristic(id) {
                self.missed_passes.remove(&id);
                continue;
            }
            let missed = self.missed_passes.entry(id).or_insert(0);
            *missed += 1;
            if *missed > REMOVAL_GRACE_PASSES {
                removed.push(id);
            }
        }
        for id in &removed {
            self.canonical_orders.remove(id);
            self.missed_passes.remove(id);
        }
        removed
    }
}
