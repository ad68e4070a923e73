use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use super::{SpaceId, SpaceOrder};
use crate::common::collections::HashMap;
use crate::sys::clock::Clock;
use crate::sys::spaces_plist::{LayoutEntry, LayoutSource, parse_layout};

/// Immutable snapshot of the canonical space list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceLayout {
    ids: Vec<SpaceId>,
    uuid_by_id: HashMap<SpaceId, String>,
    order_by_id: HashMap<SpaceId, SpaceOrder>,
}

impl SpaceLayout {
    /// Builds a layout from entries in document order. Repeated ids keep
    /// their first position.
    pub fn from_entries(entries: impl IntoIterator<Item = LayoutEntry>) -> SpaceLayout {
        let mut layout = SpaceLayout::default();
        for LayoutEntry { id, uuid } in entries {
            if layout.order_by_id.contains_key(&id) {
                continue;
            }
            layout.ids.push(id);
            layout.order_by_id.insert(id, layout.ids.len() as SpaceOrder);
            layout.uuid_by_id.insert(id, uuid);
        }
        layout
    }

    pub fn ids(&self) -> &[SpaceId] { &self.ids }

    pub fn contains(&self, id: SpaceId) -> bool { self.order_by_id.contains_key(&id) }

    pub fn order_of(&self, id: SpaceId) -> Option<SpaceOrder> { self.order_by_id.get(&id).copied() }

    pub fn uuid_of(&self, id: SpaceId) -> Option<&str> { self.uuid_by_id.get(&id).map(String::as_str) }

    pub fn id_at(&self, order: SpaceOrder) -> Option<SpaceId> {
        let index = usize::try_from(order).ok()?.checked_sub(1)?;
        self.ids.get(index).copied()
    }

    pub fn orders(&self) -> impl Iterator<Item = (SpaceId, SpaceOrder)> + '_ {
        self.ids.iter().enumerate().map(|(i, &id)| (id, i as SpaceOrder + 1))
    }
}

/// Short-lived cache over the layout document.
pub struct LayoutCache {
    source: Arc<dyn LayoutSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cached: Option<(Arc<SpaceLayout>, Instant)>,
}

impl LayoutCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

    pub fn new(source: Arc<dyn LayoutSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        LayoutCache { source, clock, ttl, cached: None }
    }

    /// Ordered space ids, or `None` when no layout has ever been readable.
    ///
    /// A fresh load replaces the snapshot. When loading fails the previous
    /// snapshot keeps being served.
    pub fn ordered_space_ids(&mut self, force_reload: bool) -> Option<Vec<SpaceId>> {
        self.layout(force_reload).map(|layout| layout.ids().to_vec())
    }

    pub fn layout(&mut self, force_reload: bool) -> Option<Arc<SpaceLayout>> {
        if !force_reload
            && let Some((layout, loaded_at)) = &self.cached
            && self.clock.now().saturating_duration_since(*loaded_at) < self.ttl
        {
            return Some(layout.clone());
        }
        self.reload().or_else(|| self.snapshot())
    }

    /// Reloads the document. Returns the new snapshot only if the load
    /// succeeded; on failure the cached snapshot is left as it was.
    pub fn reload(&mut self) -> Option<Arc<SpaceLayout>> {
        let entries = match self.source.read().and_then(|bytes| parse_layout(&bytes)) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(%err, "Layout unavailable; keeping cached snapshot");
                return None;
            }
        };
        let layout = Arc::new(SpaceLayout::from_entries(entries));
        match &self.cached {
            Some((previous, _)) if previous.ids() != layout.ids() => {
                info!(from = ?previous.ids(), to = ?layout.ids(), "Space layout changed");
            }
            None => info!(ids = ?layout.ids(), "Loaded space layout"),
            Some(_) => trace!("Space layout unchanged"),
        }
        self.cached = Some((layout.clone(), self.clock.now()));
        Some(layout)
    }

    pub fn snapshot(&self) -> Option<Arc<SpaceLayout>> {
        self.cached.as_ref().map(|(layout, _)| layout.clone())
    }
}
