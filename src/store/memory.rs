//! In-process document store.

use crate::error::{ErrorKind, Result, SyncError};
use crate::types::{Document, DocumentKey};
use crossbeam_channel::TrySendError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{ChangePayload, ChangeSender, ChannelStore, QueryFilter, StoreChange, WatchId};

/// What a watcher is looking at.
enum WatchTarget {
    Document(DocumentKey),
    Query(QueryFilter),
}

/// Internal watcher state.
struct Watcher {
    id: WatchId,
    target: WatchTarget,
    sender: ChangeSender,
}

impl Watcher {
    /// Try to deliver. Returns false if the channel is full or gone (watcher will be dropped).
    fn try_send(&self, payload: ChangePayload) -> bool {
        let change = StoreChange {
            watch: self.id,
            payload,
        };
        match self.sender.try_send(change) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(watch = ?self.id, "change channel full, dropping slow watcher");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(watch = ?self.id, "change channel closed, dropping watcher");
                false
            }
        }
    }

    fn watches(&self, key: &DocumentKey) -> bool {
        match &self.target {
            WatchTarget::Document(watched) => watched == key,
            WatchTarget::Query(filter) => filter.matches(key),
        }
    }
}

/// Reference [`ChannelStore`] backed by process memory.
///
/// Shared between clients through an `Arc`; each client gets its own watches.
/// Change notifications are emitted while the document map is locked, so
/// every watcher observes writes to a document in the order they were applied.
///
/// Faults can be injected to exercise the error paths of callers:
/// [`set_reachable`](Self::set_reachable) and
/// [`deny_writes`](Self::deny_writes).
pub struct MemoryStore {
    documents: RwLock<BTreeMap<DocumentKey, Document>>,
    watchers: RwLock<HashMap<WatchId, Watcher>>,
    next_id: AtomicU64,
    reachable: AtomicBool,
    read_only: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            read_only: RwLock::new(HashSet::new()),
        }
    }

    /// Simulate losing or regaining the connection.
    ///
    /// Going unreachable fails every call with `Transport` and tells every
    /// live watcher its watch failed.
    pub fn set_reachable(&self, reachable: bool) {
        let was = self.reachable.swap(reachable, Ordering::SeqCst);
        if !was || reachable {
            return;
        }

        // Same lock order as writes, so failures interleave cleanly with
        // change notifications.
        let _documents = self.documents.read();
        let mut to_remove = Vec::new();
        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                let delivered = watcher.try_send(ChangePayload::Failed {
                    kind: ErrorKind::Transport,
                    message: "store unreachable".to_string(),
                });
                if !delivered {
                    to_remove.push(*id);
                }
            }
        }
        self.remove_watchers(to_remove);
    }

    /// Reject every write to `collection` with a permission error.
    pub fn deny_writes(&self, collection: impl Into<String>) {
        self.read_only.write().insert(collection.into());
    }

    /// Accept writes to `collection` again.
    pub fn allow_writes(&self, collection: &str) {
        self.read_only.write().remove(collection);
    }

    /// Number of live watches.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Transport("store unreachable".to_string()))
        }
    }

    fn ensure_writable(&self, key: &DocumentKey) -> Result<()> {
        self.ensure_reachable()?;
        if self.read_only.read().contains(&key.collection) {
            return Err(SyncError::Permission(format!("writes to {key} are not allowed")));
        }
        Ok(())
    }

    fn snapshot(
        documents: &BTreeMap<DocumentKey, Document>,
        filter: &QueryFilter,
    ) -> Vec<(DocumentKey, Document)> {
        let mut result: Vec<(DocumentKey, Document)> = documents
            .iter()
            .filter(|(key, _)| filter.matches(key))
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect();
        filter.sort(&mut result);
        result
    }

    fn payload_for(
        target: &WatchTarget,
        documents: &BTreeMap<DocumentKey, Document>,
    ) -> ChangePayload {
        match target {
            WatchTarget::Document(key) => ChangePayload::Document {
                key: key.clone(),
                document: documents.get(key).cloned(),
            },
            WatchTarget::Query(filter) => ChangePayload::Collection {
                collection: filter.collection.clone(),
                documents: Self::snapshot(documents, filter),
            },
        }
    }

    /// Deliver the new state of `key` to every interested watcher.
    ///
    /// Must be called while the caller still holds the document write lock.
    fn notify(&self, documents: &BTreeMap<DocumentKey, Document>, key: &DocumentKey) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                if watcher.watches(key)
                    && !watcher.try_send(Self::payload_for(&watcher.target, documents))
                {
                    to_remove.push(*id);
                }
            }
        }

        self.remove_watchers(to_remove);
    }

    fn remove_watchers(&self, ids: Vec<WatchId>) {
        if ids.is_empty() {
            return;
        }
        let mut watchers = self.watchers.write();
        for id in ids {
            watchers.remove(&id);
        }
    }

    fn watch(&self, target: WatchTarget, sink: ChangeSender) -> Result<WatchId> {
        self.ensure_reachable()?;

        // Hold the read lock across registration and the initial snapshot so
        // no write can slip in between them.
        let documents = self.documents.read();
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let watcher = Watcher {
            id,
            target,
            sender: sink,
        };

        if !watcher.try_send(Self::payload_for(&watcher.target, &documents)) {
            return Err(SyncError::Transport(
                "could not deliver initial snapshot".to_string(),
            ));
        }

        self.watchers.write().insert(id, watcher);
        Ok(id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStore for MemoryStore {
    fn get(&self, key: &DocumentKey) -> Result<Option<Document>> {
        self.ensure_reachable()?;
        Ok(self.documents.read().get(key).cloned())
    }

    fn set(&self, key: &DocumentKey, value: Document) -> Result<()> {
        self.ensure_writable(key)?;
        let mut documents = self.documents.write();
        documents.insert(key.clone(), value);
        self.notify(&documents, key);
        Ok(())
    }

    fn update(&self, key: &DocumentKey, partial: Document) -> Result<()> {
        self.ensure_writable(key)?;
        let mut documents = self.documents.write();
        match documents.get_mut(key) {
            Some(existing) => existing.merge(&partial),
            None => return Err(SyncError::NotFound(key.clone())),
        }
        self.notify(&documents, key);
        Ok(())
    }

    fn subscribe(&self, key: &DocumentKey, sink: ChangeSender) -> Result<WatchId> {
        self.watch(WatchTarget::Document(key.clone()), sink)
    }

    fn subscribe_query(&self, filter: &QueryFilter, sink: ChangeSender) -> Result<WatchId> {
        self.watch(WatchTarget::Query(filter.clone()), sink)
    }

    fn query(&self, filter: &QueryFilter) -> Result<Vec<(DocumentKey, Document)>> {
        self.ensure_reachable()?;
        Ok(Self::snapshot(&self.documents.read(), filter))
    }

    fn unsubscribe(&self, watch: WatchId) -> Result<()> {
        // Local teardown always succeeds; repeat calls are harmless.
        self.watchers.write().remove(&watch);
        Ok(())
    }

    fn is_watching(&self, watch: WatchId) -> bool {
        // Waits out any notification in flight, including its removals.
        let _documents = self.documents.read();
        self.watchers.read().contains_key(&watch)
    }
}
