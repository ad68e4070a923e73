//! Resolution of "the current space" to a stable [`SpaceId`].
//!
//! The compositor query is tried first. When it is unsupported or answers
//! zero, the resolver falls back to a signature of the visible windows and
//! applications, minting a fresh id for every signature it has not seen
//! before. Heuristic ids come from a counter starting at 1 and are not kept
//! disjoint from compositor ids.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::layout::{LayoutCache, SpaceLayout};
use super::{SpaceId, SpaceOrder};
use crate::common::collections::{BTreeSet, HashMap, HashSet};
use crate::sys::skylight::ActiveSpaceSource;
use crate::sys::window_server::{Observation, WorkspaceObserver};

pub type SharedResolver = Arc<Mutex<SpaceResolver>>;

const SIGNATURE_GRID: f64 = 200.0;
const SIGNATURE_WINDOWS: usize = 3;

/// Processes that are present on every space and say nothing about which
/// one is showing.
const SHELL_PROCESSES: &[&str] = &[
    "Dock",
    "Window Server",
    "SystemUIServer",
    "Control Center",
    "Notification Center",
    "Spotlight",
    "WindowManager",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tier {
    System,
    Heuristic { signature: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: SpaceId,
    pub tier: Tier,
}

pub struct SpaceResolver {
    primary: Arc<dyn ActiveSpaceSource>,
    observer: Arc<dyn WorkspaceObserver>,
    layouts: LayoutCache,
    signatures: HashMap<String, SpaceId>,
    heuristic_ids: HashSet<SpaceId>,
    next_heuristic_id: u64,
}

impl SpaceResolver {
    pub fn new(
        primary: Arc<dyn ActiveSpaceSource>,
        observer: Arc<dyn WorkspaceObserver>,
        layouts: LayoutCache,
    ) -> SpaceResolver {
        SpaceResolver {
            primary,
            observer,
            layouts,
            signatures: HashMap::default(),
            heuristic_ids: HashSet::default(),
            next_heuristic_id: 1,
        }
    }

    pub fn into_shared(self) -> SharedResolver { Arc::new(Mutex::new(self)) }

    pub fn resolve(&mut self) -> Resolution {
        match self.primary.active_space() {
            Ok(0) => trace!("Active space query answered 0"),
            Ok(raw) => return Resolution { id: SpaceId::new(raw), tier: Tier::System },
            Err(err) => trace!(%err, "Falling back to heuristic signature"),
        }
        let signature = signature(&self.observer.observe());
        let id = self.id_for_signature(&signature);
        Resolution { id, tier: Tier::Heuristic { signature } }
    }

    pub fn resolve_current_space_id(&mut self) -> SpaceId { self.resolve().id }

    fn id_for_signature(&mut self, signature: &str) -> SpaceId {
        if let Some(&id) = self.signatures.get(signature) {
            return id;
        }
        let id = SpaceId::new(self.next_heuristic_id);
        self.next_heuristic_id += 1;
        debug!(?id, signature, "Minted heuristic space id");
        self.signatures.insert(signature.to_string(), id);
        self.heuristic_ids.insert(id);
        id
    }

    /// Whether `id` was minted from a window signature.
    pub fn is_heuristic(&self, id: SpaceId) -> bool { self.heuristic_ids.contains(&id) }

    /// Forces a layout reload, returning the layout only if it loaded.
    pub fn refresh_layout(&mut self) -> Option<Arc<SpaceLayout>> { self.layouts.reload() }

    pub fn ordered_space_ids(&mut self, force_reload: bool) -> Option<Vec<SpaceId>> {
        self.layouts.ordered_space_ids(force_reload)
    }

    pub fn layout(&mut self, force_reload: bool) -> Option<Arc<SpaceLayout>> {
        self.layouts.layout(force_reload)
    }

    pub fn space_number(&mut self, id: SpaceId) -> Option<SpaceOrder> {
        self.with_layout_retry(|layout| layout.order_of(id))
    }

    pub fn space_id(&mut self, order: SpaceOrder) -> Option<SpaceId> {
        self.with_layout_retry(|layout| layout.id_at(order))
    }

    pub fn space_uuid(&mut self, id: SpaceId) -> Option<String> {
        self.with_layout_retry(|layout| layout.uuid_of(id).map(str::to_string))
    }

    /// Human-readable name for `id`. Never fails.
    pub fn describe(&mut self, id: SpaceId, fallback_order: Option<SpaceOrder>) -> String {
        let layout = match self.layouts.layout(false) {
            Some(layout) if layout.contains(id) => Some(layout),
            _ => self.layouts.layout(true),
        };
        describe_in(layout.as_deref(), id, fallback_order)
    }

    fn with_layout_retry<T>(&mut self, lookup: impl Fn(&SpaceLayout) -> Option<T>) -> Option<T> {
        if let Some(found) = self.layouts.layout(false).and_then(|layout| lookup(&layout)) {
            return Some(found);
        }
        self.layouts.layout(true).and_then(|layout| lookup(&layout))
    }
}

/// Describes `id` against an already loaded layout.
pub fn describe_in(
    layout: Option<&SpaceLayout>,
    id: SpaceId,
    fallback_order: Option<SpaceOrder>,
) -> String {
    let order = layout.and_then(|l| l.order_of(id)).or(fallback_order);
    let uuid = layout.and_then(|l| l.uuid_of(id)).filter(|uuid| !uuid.is_empty());
    match (order, uuid) {
        (Some(order), Some(uuid)) => {
            let short: String = uuid.chars().take(8).collect();
            format!("Desktop {order} ({short})")
        }
        (Some(order), None) => format!("Desktop {order}"),
        (None, _) => format!("Space {id}"),
    }
}

/// Fingerprint of what is on screen. Equal observations always produce
/// equal signatures.
pub fn signature(observation: &Observation) -> String {
    let front = observation
        .frontmost
        .as_ref()
        .map(|app| app.bundle_id.clone().unwrap_or_else(|| app.name.clone()))
        .unwrap_or_default();

    let owners: BTreeSet<&str> = observation
        .windows
        .iter()
        .filter(|w| w.layer == 0)
        .map(|w| w.owner.as_str())
        .collect();
    let visible: BTreeSet<&str> = observation
        .apps
        .iter()
        .filter(|app| app.regular && !app.hidden)
        .map(|app| app.name.as_str())
        .filter(|name| owners.contains(name) && !SHELL_PROCESSES.contains(name))
        .collect();

    let mut windows: Vec<_> = observation
        .windows
        .iter()
        .filter(|w| w.layer == 0 && !SHELL_PROCESSES.contains(&w.owner.as_str()))
        .collect();
    windows.sort_by(|a, b| {
        b.area()
            .total_cmp(&a.area())
            .then_with(|| a.owner.cmp(&b.owner))
            .then_with(|| a.x.total_cmp(&b.x))
            .then_with(|| a.y.total_cmp(&b.y))
    });
    let mut positions: Vec<String> = windows
        .iter()
        .take(SIGNATURE_WINDOWS)
        .map(|w| format!("{}@{},{}", w.owner, snap(w.x), snap(w.y)))
        .collect();
    positions.sort();

    let regular_count = observation.apps.iter().filter(|app| app.regular && !app.hidden).count();

    format!(
        "{front}|{}|{}|{regular_count}",
        visible.into_iter().collect::<Vec<_>>().join(","),
        positions.join(";"),
    )
}

fn snap(coordinate: f64) -> i64 { (coordinate / SIGNATURE_GRID).round() as i64 * SIGNATURE_GRID as i64 }
