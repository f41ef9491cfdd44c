//! The remote collection store and the background writer that feeds it.
//!
//! Writes leave the caller immediately: [`StoreWriter`] owns a dedicated
//! thread that drains a channel of whole-collection saves. A failed save is
//! logged and dropped; the next subscription callback resynchronizes the
//! mirror with whatever the store holds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, warn};
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;

/// Receives the current document (or `None` when absent) on every change.
pub type UpdateCallback = Arc<dyn Fn(Option<JsonValue>) + Send + Sync>;

pub trait RemoteStore: Send + Sync {
    /// Registers `callback` for `collection`. Implementations invoke it once
    /// with the current value and again after every change.
    fn subscribe(&self, collection: &str, callback: UpdateCallback);

    /// Replaces the whole document stored under `collection`.
    fn save_all(&self, collection: &str, document: JsonValue) -> Result<(), AppResponse>;
}

/// Operations sent to the writer thread.
enum WriteOp {
    SaveAll {
        collection: String,
        document: JsonValue,
    },
    /// Answered once every earlier operation has been attempted.
    Flush { respond: Sender<()> },
    Shutdown,
}

pub struct StoreWriter {
    tx: Sender<WriteOp>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWriter {
    pub fn spawn(store: Arc<dyn RemoteStore>) -> Result<Self, AppResponse> {
        let (tx, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("remote-store-writer".to_string())
            .spawn(move || run_writer(store, rx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Queues a whole-collection save without waiting for it.
    pub fn save_all(&self, collection: &str, document: JsonValue) {
        let op = WriteOp::SaveAll {
            collection: collection.to_string(),
            document,
        };
        if self.tx.send(op).is_err() {
            warn!("Remote store writer is gone; dropping save of '{collection}'");
        }
    }

    /// Blocks until every save queued before this call has been attempted.
    pub fn flush(&self) {
        let (respond, done) = channel::bounded(1);
        if self.tx.send(WriteOp::Flush { respond }).is_err() {
            return;
        }
        let _ = done.recv();
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        let _ = self.tx.send(WriteOp::Shutdown);
        if let Some(handle) = self.handle.take() {
            // The last owner can be the writer thread itself (via a store echo).
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Remote store writer panicked");
            }
        }
    }
}

fn run_writer(store: Arc<dyn RemoteStore>, rx: Receiver<WriteOp>) {
    for op in rx {
        match op {
            WriteOp::SaveAll {
                collection,
                document,
            } => match store.save_all(&collection, document) {
                Ok(()) => debug!("Saved '{collection}' to remote store"),
                Err(e) => warn!("Remote save of '{collection}' failed: {e}"),
            },
            WriteOp::Flush { respond } => {
                let _ = respond.send(());
            }
            WriteOp::Shutdown => break,
        }
    }
}

/// Process-local remote store.
///
/// Behaves like a real-time document database: subscribers get the current
/// value on subscription and every save is echoed back to them.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    documents: HashMap<String, JsonValue>,
    subscribers: HashMap<String, Vec<UpdateCallback>>,
    saves: Vec<(String, JsonValue)>,
    reject_writes: bool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `document` without notifying anyone, as data present before start-up.
    pub fn with_document(self, collection: &str, document: JsonValue) -> Self {
        self.lock().documents.insert(collection.to_string(), document);
        self
    }

    pub fn document(&self, collection: &str) -> Option<JsonValue> {
        self.lock().documents.get(collection).cloned()
    }

    /// Every successful `save_all`, in order.
    pub fn saves(&self) -> Vec<(String, JsonValue)> {
        self.lock().saves.clone()
    }

    pub fn saves_for(&self, collection: &str) -> Vec<JsonValue> {
        self.lock()
            .saves
            .iter()
            .filter(|(name, _)| name == collection)
            .map(|(_, document)| document.clone())
            .collect()
    }

    /// Makes subsequent saves fail, as an unreachable backend would.
    pub fn reject_writes(&self, reject: bool) {
        self.lock().reject_writes = reject;
    }

    /// Simulates a change made by another client.
    pub fn push_remote(&self, collection: &str, document: Option<JsonValue>) {
        let callbacks = {
            let mut inner = self.lock();
            match &document {
                Some(doc) => {
                    inner.documents.insert(collection.to_string(), doc.clone());
                }
                None => {
                    inner.documents.remove(collection);
                }
            }
            inner.subscribers.get(collection).cloned().unwrap_or_default()
        };
        for callback in callbacks {
            callback(document.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn subscribe(&self, collection: &str, callback: UpdateCallback) {
        let current = {
            let mut inner = self.lock();
            inner
                .subscribers
                .entry(collection.to_string())
                .or_default()
                .push(callback.clone());
            inner.documents.get(collection).cloned()
        };
        callback(current);
    }

    fn save_all(&self, collection: &str, document: JsonValue) -> Result<(), AppResponse> {
        let callbacks = {
            let mut inner = self.lock();
            if inner.reject_writes {
                return Err(AppResponse::RemoteStoreError(format!(
                    "write to '{collection}' rejected"
                )));
            }
            inner.documents.insert(collection.to_string(), document.clone());
            inner.saves.push((collection.to_string(), document.clone()));
            inner.subscribers.get(collection).cloned().unwrap_or_default()
        };
        for callback in callbacks {
            callback(Some(document.clone()));
        }
        Ok(())
    }
}
