//! Subscription manager: one live store watch per slot.

use crate::error::Result;
use crate::protocol::Event;
use crate::store::{ChannelStore, WatchId};
use crate::types::Timestamp;
use std::collections::HashMap;

use super::types::{Subscription, SubscriptionKey, SubscriptionTarget};

/// Internal slot state.
struct ActiveSubscription {
    watch: WatchId,
    target: SubscriptionTarget,
    installed_at: Timestamp,
    /// Last event projected from this watch.
    last_event: Option<Event>,
}

/// Tracks the live watch for every [`SubscriptionKey`].
///
/// Owned by a single event loop, so no locking. Unsubscribing is best effort:
/// failures are logged and never retried, since a repeated unsubscribe is
/// harmless to the store.
#[derive(Default)]
pub struct SubscriptionManager {
    active: HashMap<SubscriptionKey, ActiveSubscription>,
    /// Reverse index used to route deliveries.
    by_watch: HashMap<WatchId, SubscriptionKey>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a watch into `key`, tearing down any previous one first.
    ///
    /// The old watch is gone before `subscribe` runs, so its deliveries are
    /// never routed again. If `subscribe` fails the slot stays empty.
    pub fn replace<F>(
        &mut self,
        store: &dyn ChannelStore,
        key: SubscriptionKey,
        target: SubscriptionTarget,
        subscribe: F,
    ) -> Result<WatchId>
    where
        F: FnOnce() -> Result<WatchId>,
    {
        self.clear(store, key);

        let watch = subscribe()?;
        tracing::debug!(slot = %key, ?watch, ?target, "subscription installed");

        self.by_watch.insert(watch, key);
        self.active.insert(
            key,
            ActiveSubscription {
                watch,
                target,
                installed_at: Timestamp::now(),
                last_event: None,
            },
        );
        Ok(watch)
    }

    /// Remove and unsubscribe `key`. Returns whether anything was installed.
    pub fn clear(&mut self, store: &dyn ChannelStore, key: SubscriptionKey) -> bool {
        let Some(old) = self.active.remove(&key) else {
            return false;
        };
        self.by_watch.remove(&old.watch);

        if let Err(e) = store.unsubscribe(old.watch) {
            tracing::warn!(slot = %key, watch = ?old.watch, error = %e, "unsubscribe failed");
        } else {
            tracing::debug!(slot = %key, watch = ?old.watch, "subscription removed");
        }
        true
    }

    /// Remove every subscription.
    pub fn clear_all(&mut self, store: &dyn ChannelStore) {
        let keys: Vec<SubscriptionKey> = self.active.keys().copied().collect();
        for key in keys {
            self.clear(store, key);
        }
    }

    /// Route a delivery. `None` means the watch is stale or unknown and the
    /// delivery must be dropped.
    pub fn resolve(&self, watch: WatchId) -> Option<(SubscriptionKey, &SubscriptionTarget)> {
        let key = *self.by_watch.get(&watch)?;
        self.active.get(&key).map(|sub| (key, &sub.target))
    }

    /// Record `event` as the latest for `key`. Returns false if it repeats
    /// the previous one (or the slot is gone).
    pub fn remember(&mut self, key: SubscriptionKey, event: &Event) -> bool {
        match self.active.get_mut(&key) {
            Some(sub) if sub.last_event.as_ref() == Some(event) => false,
            Some(sub) => {
                sub.last_event = Some(event.clone());
                true
            }
            None => false,
        }
    }

    /// Last event projected for `key`.
    pub fn last_event(&self, key: SubscriptionKey) -> Option<&Event> {
        self.active.get(&key)?.last_event.as_ref()
    }

    /// Slots whose watch the store has stopped serving, ordered by key.
    pub fn lost(&self, store: &dyn ChannelStore) -> Vec<(SubscriptionKey, SubscriptionTarget)> {
        let mut lost: Vec<_> = self
            .active
            .iter()
            .filter(|(_, sub)| !store.is_watching(sub.watch))
            .map(|(key, sub)| (*key, sub.target.clone()))
            .collect();
        lost.sort_by_key(|(key, _)| *key);
        lost
    }

    pub fn get(&self, key: SubscriptionKey) -> Option<Subscription> {
        self.active.get(&key).map(|sub| Subscription {
            key,
            kind: key.kind(),
            target: sub.target.clone(),
            watch: sub.watch,
            installed_at: sub.installed_at,
        })
    }

    pub fn is_active(&self, key: SubscriptionKey) -> bool {
        self.active.contains_key(&key)
    }

    /// Number of live subscriptions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// All live subscriptions, ordered by key.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut keys: Vec<SubscriptionKey> = self.active.keys().copied().collect();
        keys.sort();
        keys.into_iter().filter_map(|key| self.get(key)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangePayload, MemoryStore};
    use crate::types::{Document, DocumentKey};
    use crossbeam_channel::unbounded;

    fn channel_target(owner: &str) -> SubscriptionTarget {
        SubscriptionTarget::Channel {
            owner_id: owner.to_string(),
            key: DocumentKey::new("channels", owner),
        }
    }

    #[test]
    fn test_replace_unsubscribes_previous() {
        let store = MemoryStore::new();
        let (tx, rx) = unbounded();
        let mut subs = SubscriptionManager::new();

        let a = DocumentKey::new("channels", "a");
        let b = DocumentKey::new("channels", "b");

        let first = subs
            .replace(&store, SubscriptionKey::ViewedChannel, channel_target("a"), || {
                store.subscribe(&a, tx.clone())
            })
            .unwrap();
        let second = subs
            .replace(&store, SubscriptionKey::ViewedChannel, channel_target("b"), || {
                store.subscribe(&b, tx.clone())
            })
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(subs.active_count(), 1);
        assert_eq!(store.watcher_count(), 1);
        assert!(subs.resolve(first).is_none());

        let (key, target) = subs.resolve(second).unwrap();
        assert_eq!(key, SubscriptionKey::ViewedChannel);
        assert_eq!(target.owner_id(), Some("b"));

        // Both initial snapshots were queued; only the second still routes.
        let routable: Vec<_> = rx
            .try_iter()
            .filter(|c| subs.resolve(c.watch).is_some())
            .collect();
        assert_eq!(routable.len(), 1);
        assert!(matches!(
            &routable[0].payload,
            ChangePayload::Document { key, .. } if key.id == "b"
        ));
    }

    #[test]
    fn test_independent_keys_coexist() {
        let store = MemoryStore::new();
        let (tx, _rx) = unbounded();
        let mut subs = SubscriptionManager::new();
        let key = DocumentKey::new("channels", "a");

        subs.replace(&store, SubscriptionKey::OwnChannel, channel_target("a"), || {
            store.subscribe(&key, tx.clone())
        })
        .unwrap();
        subs.replace(&store, SubscriptionKey::ViewedChannel, channel_target("a"), || {
            store.subscribe(&key, tx.clone())
        })
        .unwrap();

        assert_eq!(subs.active_count(), 2);
        let keys: Vec<_> = subs.subscriptions().iter().map(|s| s.key).collect();
        assert_eq!(
            keys,
            vec![SubscriptionKey::OwnChannel, SubscriptionKey::ViewedChannel]
        );
    }

    #[test]
    fn test_failed_subscribe_leaves_slot_empty() {
        let store = MemoryStore::new();
        let (tx, _rx) = unbounded();
        let mut subs = SubscriptionManager::new();
        let key = DocumentKey::new("channels", "a");

        subs.replace(&store, SubscriptionKey::ViewedChannel, channel_target("a"), || {
            store.subscribe(&key, tx.clone())
        })
        .unwrap();

        store.set_reachable(false);
        let result = subs.replace(&store, SubscriptionKey::ViewedChannel, channel_target("a"), || {
            store.subscribe(&key, tx.clone())
        });

        assert!(result.is_err());
        assert!(!subs.is_active(SubscriptionKey::ViewedChannel));
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = MemoryStore::new();
        let (tx, _rx) = unbounded();
        let mut subs = SubscriptionManager::new();
        let key = DocumentKey::new("tracks", "now-playing");

        subs.replace(
            &store,
            SubscriptionKey::NowPlaying,
            SubscriptionTarget::TrackDocument(key.clone()),
            || store.subscribe(&key, tx.clone()),
        )
        .unwrap();

        assert!(subs.clear(&store, SubscriptionKey::NowPlaying));
        assert!(!subs.clear(&store, SubscriptionKey::NowPlaying));
        assert_eq!(store.watcher_count(), 0);
        assert!(subs.get(SubscriptionKey::NowPlaying).is_none());
    }

    #[test]
    fn test_remember_suppresses_repeats() {
        let store = MemoryStore::new();
        let (tx, _rx) = unbounded();
        let mut subs = SubscriptionManager::new();
        let key = DocumentKey::new("tracks", "now-playing");

        assert!(!subs.remember(SubscriptionKey::NowPlaying, &Event::NewTrack("a".into())));

        subs.replace(
            &store,
            SubscriptionKey::NowPlaying,
            SubscriptionTarget::TrackDocument(key.clone()),
            || store.subscribe(&key, tx.clone()),
        )
        .unwrap();

        assert!(subs.remember(SubscriptionKey::NowPlaying, &Event::NewTrack("a".into())));
        assert!(!subs.remember(SubscriptionKey::NowPlaying, &Event::NewTrack("a".into())));
        assert!(subs.remember(SubscriptionKey::NowPlaying, &Event::NewTrack("b".into())));
    }

    #[test]
    fn test_lost_reports_dropped_watches() {
        let store = MemoryStore::new();
        let (slow_tx, _slow_rx) = crossbeam_channel::bounded(1);
        let (tx, _rx) = unbounded();
        let mut subs = SubscriptionManager::new();
        let track = DocumentKey::new("tracks", "now-playing");
        let channel = DocumentKey::new("channels", "a");

        subs.replace(
            &store,
            SubscriptionKey::NowPlaying,
            SubscriptionTarget::TrackDocument(track.clone()),
            || store.subscribe(&track, slow_tx.clone()),
        )
        .unwrap();
        subs.replace(&store, SubscriptionKey::ViewedChannel, channel_target("a"), || {
            store.subscribe(&channel, tx.clone())
        })
        .unwrap();
        assert!(subs.lost(&store).is_empty());

        store.set(&track, Document::new().with("uri", "x")).unwrap();

        let lost = subs.lost(&store);
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].0, SubscriptionKey::NowPlaying);
        assert_eq!(lost[0].1, SubscriptionTarget::TrackDocument(track));
        // Still installed until the owner acts on it.
        assert!(subs.is_active(SubscriptionKey::NowPlaying));
    }

    #[test]
    fn test_clear_all() {
        let store = MemoryStore::new();
        let (tx, _rx) = unbounded();
        let mut subs = SubscriptionManager::new();
        let key = DocumentKey::new("channels", "a");

        for slot in [SubscriptionKey::OwnChannel, SubscriptionKey::ViewedChannel] {
            subs.replace(&store, slot, channel_target("a"), || {
                store.subscribe(&key, tx.clone())
            })
            .unwrap();
        }
        subs.clear_all(&store);

        assert_eq!(subs.active_count(), 0);
        assert_eq!(store.watcher_count(), 0);
    }
}
