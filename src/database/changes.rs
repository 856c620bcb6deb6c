use super::{EntityKind, Record, RecordFilter, Store};
use crate::error::AppError;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// A committed write to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub kind: EntityKind,
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
}

impl Change {
    pub fn of<R: Record>(record: &R) -> Self {
        Self {
            kind: R::KIND,
            id: record.id(),
            parent_id: record.parent_id(),
        }
    }

    pub fn new(kind: EntityKind, id: Uuid, parent_id: Option<Uuid>) -> Self {
        Self { kind, id, parent_id }
    }
}

/// Fan-out of committed changes to all subscriptions
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<Change>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish_all(&self, changes: Vec<Change>) {
        for change in changes {
            // No receivers is fine
            let _ = self.tx.send(change);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Live query over one record type.
///
/// The first call to [`Subscription::next`] yields the current result set. Every
/// later call waits for a committed change that may affect the filter and then
/// yields the re-queried set. Delivery is at-least-once: a lagging receiver
/// re-queries instead of dropping updates.
pub struct Subscription<R: Record> {
    store: Store,
    filter: R::Filter,
    rx: broadcast::Receiver<Change>,
    primed: bool,
}

impl<R: Record> Subscription<R> {
    pub(super) fn new(store: Store, filter: R::Filter, rx: broadcast::Receiver<Change>) -> Self {
        Self {
            store,
            filter,
            rx,
            primed: false,
        }
    }

    /// Next result set, `None` when the change channel is closed
    pub async fn next(&mut self) -> Option<Result<Vec<R>, AppError>> {
        if self.primed {
            loop {
                match self.rx.recv().await {
                    Ok(change) if change.kind == R::KIND && self.filter.may_match(&change) => {
                        break
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!(
                            "{:?} subscription lagged by {} changes, re-querying",
                            R::KIND,
                            skipped
                        );
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
        self.primed = true;
        Some(self.store.query::<R>(&self.filter))
    }
}
