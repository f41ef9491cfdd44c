//! Local mirror of one remote collection.
//!
//! A mirror holds the latest normalized sequence as an immutable
//! [`CollectionSnapshot`] behind an `Arc`: readers clone the pointer and never
//! observe a collection halfway through an update.
//!
//! Storing a snapshot and notifying listeners are separate steps. The sync
//! engine reconciles the session in between and notifies outside its
//! mutation lock, so listeners may publish.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::debug;
use serde_json::Value as JsonValue;

use crate::collection_kind::CollectionKind;
use crate::normalizer::normalize_raw;
use crate::sync_model::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub kind: CollectionKind,
    /// Number of replacements applied so far; `0` until the first update.
    pub revision: u64,
    pub records: Vec<Record>,
}

impl CollectionSnapshot {
    fn empty(kind: CollectionKind) -> Self {
        Self {
            kind,
            revision: 0,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub type MirrorListener = Arc<dyn Fn(&Arc<CollectionSnapshot>) + Send + Sync>;

/// Handle returned by [`CollectionMirror::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub struct CollectionMirror {
    kind: CollectionKind,
    snapshot: RwLock<Arc<CollectionSnapshot>>,
    listeners: Mutex<Listeners>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, MirrorListener)>,
}

impl CollectionMirror {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            snapshot: RwLock::new(Arc::new(CollectionSnapshot::empty(kind))),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    pub fn current(&self) -> Arc<CollectionSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Normalizes a raw remote document and stores it as the next snapshot.
    pub(crate) fn on_update(&self, raw: Option<JsonValue>) -> Arc<CollectionSnapshot> {
        self.replace(normalize_raw(self.kind, raw))
    }

    /// Stores `records` as the next snapshot without notifying anyone.
    ///
    /// The owner runs its downstream hooks and then hands the snapshot to
    /// [`CollectionMirror::notify`] once its own locks are released.
    pub(crate) fn replace(&self, records: Vec<Record>) -> Arc<CollectionSnapshot> {
        let snapshot = {
            let mut held = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            let next = Arc::new(CollectionSnapshot {
                kind: self.kind,
                revision: held.revision + 1,
                records,
            });
            *held = next.clone();
            next
        };
        debug!(
            "Mirror '{}' at revision {} holds {} records",
            self.kind,
            snapshot.revision,
            snapshot.len()
        );
        snapshot
    }

    pub fn subscribe(&self, listener: MirrorListener) -> ListenerId {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    pub(crate) fn notify(&self, snapshot: &Arc<CollectionSnapshot>) {
        let listeners: Vec<MirrorListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}
