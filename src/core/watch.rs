//! Watcher registry for the write-notify loop.
//!
//! Each watcher owns the document it re-reads, the entity ids its last
//! read touched, and a callback. The write path reports changed ids into
//! the pending set; the cache flushes at the end of every public mutation,
//! re-reading only the watchers whose touched set intersects the pending
//! ids and firing callbacks only when the delivered result actually
//! changed. Callbacks fire in watcher-registration order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crossbeam::channel::{Receiver, RecvError, TryRecvError, unbounded};
use serde_json::Value;

use super::document::Document;
use super::error::CacheError;
use super::field_key::Variables;
use super::identity::{EntityId, WatcherId};
use super::read::{Path, ReadResult};

/// Snapshot delivered to a watcher when its result changes.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchUpdate {
    pub data: Option<Value>,
    pub missing: Vec<Path>,
}

impl WatchUpdate {
    pub(crate) fn from_result(result: &ReadResult) -> Self {
        Self {
            data: result.data.clone(),
            missing: result.missing.clone(),
        }
    }
}

/// Whether the callback's consumer is still listening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchStatus {
    Active,
    Closed,
}

pub(crate) type WatchCallback = Box<dyn FnMut(WatchUpdate) -> WatchStatus>;

pub(crate) struct Watcher {
    pub(crate) document: Arc<Document>,
    pub(crate) variables: Variables,
    pub(crate) start: EntityId,
    pub(crate) callback: WatchCallback,
    pub(crate) touched: BTreeSet<EntityId>,
    pub(crate) last: Option<ReadResult>,
}

/// Handle returned by `watch`; pass back to `unwatch` to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchHandle {
    pub(crate) id: WatcherId,
}

#[derive(Default)]
pub(crate) struct WatchRegistry {
    watchers: BTreeMap<WatcherId, Watcher>,
    next_watcher_id: u64,
    pending: BTreeSet<EntityId>,
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        Self {
            watchers: BTreeMap::new(),
            next_watcher_id: 1,
            pending: BTreeSet::new(),
        }
    }

    pub(crate) fn register(
        &mut self,
        watcher: Watcher,
        max_watchers: usize,
    ) -> Result<WatchHandle, CacheError> {
        if self.watchers.len() >= max_watchers {
            return Err(CacheError::WatcherLimit { max_watchers });
        }
        let id = WatcherId(self.next_watcher_id);
        self.next_watcher_id = self.next_watcher_id.saturating_add(1);
        self.watchers.insert(id, watcher);
        Ok(WatchHandle { id })
    }

    pub(crate) fn remove(&mut self, id: WatcherId) -> bool {
        self.watchers.remove(&id).is_some()
    }

    pub(crate) fn mark_dirty<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.pending.extend(ids);
    }

    pub(crate) fn take_pending(&mut self) -> BTreeSet<EntityId> {
        std::mem::take(&mut self.pending)
    }

    /// Watchers whose dependency set intersects `dirty`, in registration
    /// order.
    pub(crate) fn intersecting(&self, dirty: &BTreeSet<EntityId>) -> Vec<WatcherId> {
        self.watchers
            .iter()
            .filter(|(_, watcher)| !watcher.touched.is_disjoint(dirty))
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn get_mut(&mut self, id: WatcherId) -> Option<&mut Watcher> {
        self.watchers.get_mut(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.len()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Channel-delivered watch: updates queue until the consumer drains them,
/// so the consumer never re-enters the cache from inside a callback.
/// Dropping the subscription unsubscribes the watcher at the next flush.
pub struct WatchSubscription {
    handle: WatchHandle,
    receiver: Receiver<WatchUpdate>,
}

impl WatchSubscription {
    pub(crate) fn new(handle: WatchHandle, receiver: Receiver<WatchUpdate>) -> Self {
        Self { handle, receiver }
    }

    pub fn handle(&self) -> WatchHandle {
        self.handle
    }

    pub fn recv(&self) -> Result<WatchUpdate, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<WatchUpdate, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every queued update without blocking.
    pub fn drain(&self) -> Vec<WatchUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.receiver.try_recv() {
            updates.push(update);
        }
        updates
    }
}

/// Callback that forwards updates into an unbounded channel. The watcher
/// reports itself closed once the receiver is dropped, and is removed at
/// the next flush.
pub(crate) fn channel_callback() -> (WatchCallback, Receiver<WatchUpdate>) {
    let (sender, receiver) = unbounded();
    let callback: WatchCallback = Box::new(move |update| match sender.send(update) {
        Ok(()) => WatchStatus::Active,
        Err(_) => WatchStatus::Closed,
    });
    (callback, receiver)
}
