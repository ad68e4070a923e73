use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info_span, warn};

use super::{Event, Reactor, Sender};
use crate::model::identity::describe_in;
use crate::model::server::{CurrentSpace, SpaceStatus, StatusSnapshot, sort_spaces};
use crate::model::{SpaceId, SpaceOrder};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("reactor is not running")]
    ReactorGone,
}

#[derive(Clone)]
pub struct ReactorQueryHandle {
    tx: Sender,
}

impl ReactorQueryHandle {
    pub(crate) fn new(tx: Sender) -> Self { Self { tx } }

    async fn send_query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> QueryRequest,
    ) -> Result<T, QueryError> {
        let (tx, rx) = oneshot::channel();
        if self.tx.try_send(Event::Query(build(tx))).is_err() {
            return Err(QueryError::ReactorGone);
        }
        rx.await.map_err(|_| QueryError::ReactorGone)
    }

    pub async fn toggle_space(&self, id: SpaceId) -> Result<bool, QueryError> {
        self.send_query(|resp| QueryRequest::ToggleSpace { id, resp }).await
    }

    pub async fn set_space(&self, id: SpaceId, enabled: bool) -> Result<bool, QueryError> {
        self.send_query(|resp| QueryRequest::SetSpace { id, enabled, resp }).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, QueryError> {
        self.send_query(QueryRequest::Status).await
    }
}

#[derive(Debug)]
pub enum QueryRequest {
    ToggleSpace {
        id: SpaceId,
        resp: oneshot::Sender<bool>,
    },
    SetSpace {
        id: SpaceId,
        enabled: bool,
        resp: oneshot::Sender<bool>,
    },
    Status(oneshot::Sender<StatusSnapshot>),
}

impl Reactor {
    pub(super) fn handle_query_request(&mut self, req: QueryRequest) {
        match req {
            QueryRequest::ToggleSpace { id, resp } => {
                let _ = resp.send(self.toggle_space(id));
            }
            QueryRequest::SetSpace { id, enabled, resp } => {
                let _ = resp.send(self.set_space(id, enabled));
            }
            QueryRequest::Status(resp) => {
                let _ = resp.send(self.status());
            }
        }
    }

    fn toggle_space(&mut self, id: SpaceId) -> bool {
        let _s = info_span!("reactor::toggle_space", ?id).entered();
        self.known_spaces.insert(id);
        let enabled = self.store.toggle(id);
        self.persist();
        self.apply_current();
        enabled
    }

    fn set_space(&mut self, id: SpaceId, enabled: bool) -> bool {
        let _s = info_span!("reactor::set_space", ?id, enabled).entered();
        self.known_spaces.insert(id);
        if self.store.set(id, enabled) {
            self.persist();
        }
        self.apply_current();
        enabled
    }

    fn status(&mut self) -> StatusSnapshot {
        let _s = info_span!("reactor::status").entered();
        let previous = self.current;
        let (layout, current) = {
            let mut resolver = self.resolver.lock();
            let id = resolver.resolve_current_space_id();
            let layout = resolver.layout(true);
            let current = (!id.is_unknown()).then(|| {
                let order = layout.as_ref().and_then(|l| l.order_of(id)).or_else(|| {
                    previous.filter(|(prev, _)| *prev == id).and_then(|(_, order)| order)
                });
                (id, order)
            });
            (layout, current)
        };

        if let Some((id, _)) = current {
            self.current = current;
            self.known_spaces.insert(id);
        }
        if let Some(layout) = &layout {
            self.known_spaces.extend(layout.ids().iter().copied());
        }
        let enabled = self.store.enabled_spaces();
        self.known_spaces.extend(enabled.iter().copied());

        let fallback_order = |id: SpaceId| -> Option<SpaceOrder> {
            current.filter(|(cur, _)| *cur == id).and_then(|(_, order)| order)
        };
        let mut spaces: Vec<SpaceStatus> = self
            .known_spaces
            .iter()
            .map(|&id| SpaceStatus {
                id,
                order: layout.as_ref().and_then(|l| l.order_of(id)),
                uuid: layout.as_ref().and_then(|l| l.uuid_of(id)).map(str::to_string),
                description: describe_in(layout.as_deref(), id, fallback_order(id)),
                enabled: enabled.contains(&id),
            })
            .collect();
        sort_spaces(&mut spaces);

        let current_entry = current.map(|(id, order)| {
            spaces.iter().find(|s| s.id == id).cloned().unwrap_or_else(|| SpaceStatus {
                id,
                order,
                uuid: None,
                description: describe_in(layout.as_deref(), id, order),
                enabled: enabled.contains(&id),
            })
        });
        let desired = current_entry.as_ref().is_some_and(|entry| entry.enabled);
        let live = match self.toggle.read() {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "Unable to read preference; reporting desired state");
                desired
            }
        };
        debug!(current = ?current_entry, known = spaces.len(), "Built status");

        StatusSnapshot {
            current: CurrentSpace {
                enabled: live,
                space: current.and_then(|(_, order)| order),
                id: current.map(|(id, _)| id),
            },
            spaces,
        }
    }
}
