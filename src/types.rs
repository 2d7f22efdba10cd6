//! Core types for channels, tracks and store documents.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field holding the uri of the Track document.
pub const URI_FIELD: &str = "uri";

/// Field holding a channel's display name.
pub const NAME_FIELD: &str = "name";

/// Field holding a channel's current track.
pub const NOW_PLAYING_FIELD: &str = "nowPlayingURI";

/// Address of a document: `collection/id`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Parse a `collection/id` path.
    pub fn parse(path: &str) -> Result<Self> {
        match path.split_once('/') {
            Some((collection, id))
                if !collection.is_empty() && !id.is_empty() && !id.contains('/') =>
            {
                Ok(Self::new(collection, id))
            }
            _ => Err(SyncError::Serialization(format!(
                "invalid document path {path:?}, expected collection/id"
            ))),
        }
    }
}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentKey({}/{})", self.collection, self.id)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A store document: a flat JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SyncError::Serialization(format!(
                "document must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String field, `None` if absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Partial merge: only fields named in `partial` change.
    pub fn merge(&mut self, partial: &Document) {
        for (field, value) in &partial.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity produced by the external auth exchange.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// The currently playing media reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
}

impl Track {
    /// Read a Track from its document; `None` when the uri field is missing.
    pub fn from_document(doc: &Document) -> Option<Self> {
        doc.get_str(URI_FIELD).map(|uri| Self {
            uri: uri.to_string(),
        })
    }
}

/// Fallbacks applied when a channel document lacks a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelDefaults {
    pub name: String,
    pub track_uri: String,
}

/// One broadcast channel, keyed by its owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub name: String,
    #[serde(rename = "nowPlayingURI")]
    pub now_playing_uri: String,
}

impl Channel {
    /// Project a channel document, filling missing fields from `defaults`.
    ///
    /// The owner always comes from the document key, never from the body.
    pub fn project(owner_id: &str, doc: Option<&Document>, defaults: &ChannelDefaults) -> Self {
        let name = doc
            .and_then(|d| d.get_str(NAME_FIELD))
            .unwrap_or(&defaults.name);
        let now_playing_uri = doc
            .and_then(|d| d.get_str(NOW_PLAYING_FIELD))
            .unwrap_or(&defaults.track_uri);
        Self {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            now_playing_uri: now_playing_uri.to_string(),
        }
    }

    /// Store-side body. The owner is the key, so it is not written.
    pub fn to_document(&self) -> Document {
        Document::new()
            .with(NAME_FIELD, self.name.clone())
            .with(NOW_PLAYING_FIELD, self.now_playing_uri.clone())
    }

    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            owner_id: self.owner_id.clone(),
            name: self.name.clone(),
            now_playing_uri: self.now_playing_uri.clone(),
        }
    }
}

/// Channel projection plus its key, as sent to the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub name: String,
    #[serde(rename = "nowPlayingURI")]
    pub now_playing_uri: String,
}

/// Channel data as submitted by the UI.
///
/// `owner_id` is accepted on the wire but never trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDraft {
    pub name: String,
    #[serde(rename = "nowPlayingURI")]
    pub now_playing_uri: String,
    #[serde(rename = "ownerId", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl ChannelDraft {
    pub fn new(name: impl Into<String>, now_playing_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            now_playing_uri: now_playing_uri.into(),
            owner_id: None,
        }
    }

    /// Bind the draft to `owner`, discarding any supplied owner id.
    pub fn into_channel(self, owner: &Identity) -> Channel {
        Channel {
            owner_id: owner.user_id.clone(),
            name: self.name,
            now_playing_uri: self.now_playing_uri,
        }
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}
