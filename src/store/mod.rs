//! Document store abstraction with live change subscriptions.
//!
//! A store holds flat JSON documents addressed by `collection/id` and pushes
//! change notifications to watchers:
//! - Document watches receive the current value right away, then every change
//! - Query watches receive the whole (sorted) collection on every change
//! - Writes made by this process are echoed back to its own watchers
//! - A watcher whose channel is full or closed is dropped; see
//!   [`ChannelStore::is_watching`]
//!
//! Notifications are sent as [`StoreChange`] values on a caller-supplied
//! channel, so one consumer can multiplex every watch it owns.
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new();
//! let (tx, rx) = crossbeam_channel::unbounded();
//!
//! let key = DocumentKey::parse("tracks/now-playing")?;
//! let watch = store.subscribe(&key, tx)?;
//! store.set(&key, Document::new().with("uri", "spotify:track:1"))?;
//!
//! // Initial snapshot (missing), then the write
//! for change in rx.try_iter() {
//!     println!("{:?}", change.payload);
//! }
//! store.unsubscribe(watch)?;
//! ```

mod memory;

pub use memory::MemoryStore;

use crate::error::{ErrorKind, Result};
use crate::types::{Document, DocumentKey};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of one live watch on a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl fmt::Debug for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchId({})", self.0)
    }
}

/// Sending half of a change-notification channel.
pub type ChangeSender = crossbeam_channel::Sender<StoreChange>;

/// A notification delivered to a watcher.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    pub watch: WatchId,
    pub payload: ChangePayload,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChangePayload {
    /// Snapshot of a single document (`None` = does not exist).
    Document {
        key: DocumentKey,
        document: Option<Document>,
    },
    /// Snapshot of a whole query result, already sorted.
    Collection {
        collection: String,
        documents: Vec<(DocumentKey, Document)>,
    },
    /// The watch could not be served.
    Failed { kind: ErrorKind, message: String },
}

/// Collection query with optional ordering by a string field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryFilter {
    pub collection: String,
    pub order_by: Option<String>,
}

impl QueryFilter {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn matches(&self, key: &DocumentKey) -> bool {
        key.collection == self.collection
    }

    /// Sort by the ordering field (missing sorts first), ties by document id.
    pub fn sort(&self, documents: &mut [(DocumentKey, Document)]) {
        documents.sort_by(|(ka, da), (kb, db)| {
            let by_field = match &self.order_by {
                Some(field) => da
                    .get_str(field)
                    .unwrap_or("")
                    .cmp(db.get_str(field).unwrap_or("")),
                None => Ordering::Equal,
            };
            by_field.then_with(|| ka.id.cmp(&kb.id))
        });
    }
}

/// Narrow interface to a remote document store.
///
/// `set` and `update` must be atomic per document, and a store must deliver
/// changes to a given watch in the order it applied them.
pub trait ChannelStore: Send + Sync {
    /// Read a document, `None` if it does not exist.
    fn get(&self, key: &DocumentKey) -> Result<Option<Document>>;

    /// Create or replace a document.
    fn set(&self, key: &DocumentKey, value: Document) -> Result<()>;

    /// Merge `partial` into an existing document.
    fn update(&self, key: &DocumentKey, partial: Document) -> Result<()>;

    /// Watch one document. The current value is delivered immediately.
    fn subscribe(&self, key: &DocumentKey, sink: ChangeSender) -> Result<WatchId>;

    /// Watch a query. The current result is delivered immediately.
    fn subscribe_query(&self, filter: &QueryFilter, sink: ChangeSender) -> Result<WatchId>;

    /// One-shot query.
    fn query(&self, filter: &QueryFilter) -> Result<Vec<(DocumentKey, Document)>>;

    /// Stop a watch. Unknown ids are not an error.
    fn unsubscribe(&self, watch: WatchId) -> Result<()>;

    /// Whether `watch` is still being served. A store may end a watch on its
    /// own, e.g. when the watcher cannot keep up; callers poll this to notice.
    fn is_watching(&self, watch: WatchId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: Option<&str>) -> (DocumentKey, Document) {
        let doc = match name {
            Some(n) => Document::new().with("name", n),
            None => Document::new(),
        };
        (DocumentKey::new("channels", id), doc)
    }

    #[test]
    fn test_sort_by_field_then_id() {
        let filter = QueryFilter::collection("channels").order_by("name");
        let mut docs = vec![
            entry("c", Some("Beta")),
            entry("b", Some("Alpha")),
            entry("a", Some("Beta")),
            entry("d", None),
        ];
        filter.sort(&mut docs);

        let ids: Vec<&str> = docs.iter().map(|(k, _)| k.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_unordered_sorts_by_id() {
        let filter = QueryFilter::collection("channels");
        let mut docs = vec![entry("z", Some("A")), entry("a", Some("Z"))];
        filter.sort(&mut docs);
        assert_eq!(docs[0].0.id, "a");
    }

    #[test]
    fn test_matches_collection() {
        let filter = QueryFilter::collection("channels");
        assert!(filter.matches(&DocumentKey::new("channels", "x")));
        assert!(!filter.matches(&DocumentKey::new("tracks", "x")));
    }
}
