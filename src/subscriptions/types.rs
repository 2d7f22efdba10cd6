//! Subscription slot types.

use crate::store::{QueryFilter, WatchId};
use crate::types::{DocumentKey, Timestamp};
use std::fmt;

/// Logical slot a subscription occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionKey {
    /// The track the UI is following: the shared Track document, or the
    /// now-playing field of a selected channel.
    NowPlaying,
    /// The signed-in user's own channel.
    OwnChannel,
    /// A channel opened with `GetUserChannel`.
    ViewedChannel,
    /// All channels, ordered by name.
    ChannelList,
}

impl SubscriptionKey {
    pub fn kind(self) -> SubscriptionKind {
        match self {
            SubscriptionKey::NowPlaying => SubscriptionKind::Track,
            SubscriptionKey::OwnChannel | SubscriptionKey::ViewedChannel => {
                SubscriptionKind::Channel
            }
            SubscriptionKey::ChannelList => SubscriptionKind::ChannelList,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionKey::NowPlaying => "now-playing",
            SubscriptionKey::OwnChannel => "own-channel",
            SubscriptionKey::ViewedChannel => "viewed-channel",
            SubscriptionKey::ChannelList => "channel-list",
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Track,
    Channel,
    ChannelList,
}

/// What the store watch behind a slot is scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionTarget {
    /// The shared Track document.
    TrackDocument(DocumentKey),
    /// One channel document.
    Channel { owner_id: String, key: DocumentKey },
    /// A channel listing query.
    ChannelList(QueryFilter),
}

impl SubscriptionTarget {
    /// Owner of the watched channel, if this target is a channel.
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            SubscriptionTarget::Channel { owner_id, .. } => Some(owner_id),
            _ => None,
        }
    }
}

/// Read-only view of a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub key: SubscriptionKey,
    pub kind: SubscriptionKind,
    pub target: SubscriptionTarget,
    pub watch: WatchId,
    pub installed_at: Timestamp,
}
