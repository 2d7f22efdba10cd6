//! Runtime configuration.

use crate::error::{Result, SyncError};
use crate::types::{ChannelDefaults, DocumentKey};
use serde::Deserialize;
use std::path::Path;

/// Configuration for a bridge and its router.
///
/// Every field has a default, so a partial JSON file is valid.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path of the shared Track document.
    /// Default: `tracks/now-playing`
    pub track_document: String,

    /// Collection holding one channel document per owner.
    /// Default: `channels`
    pub channels_collection: String,

    /// Name reported for a channel that has none yet.
    pub default_channel_name: String,

    /// Track uri reported for a channel that has none yet.
    pub placeholder_track_uri: String,

    /// Capacity of the store-change channel feeding the event loop.
    /// Must be non-zero. Default: 1024
    pub change_buffer: usize,

    /// Capacity of the outbound event channel to the UI.
    /// Must be non-zero. Default: 1024
    pub event_buffer: usize,

    /// Watch the shared Track document as soon as the bridge starts.
    pub follow_track_on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            track_document: "tracks/now-playing".to_string(),
            channels_collection: "channels".to_string(),
            default_channel_name: "New".to_string(),
            placeholder_track_uri: "spotify:track:none".to_string(),
            change_buffer: 1024,
            event_buffer: 1024,
            follow_track_on_start: true,
        }
    }
}

impl SyncConfig {
    /// Parse from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.track_key()?;
        for (field, value) in [
            ("change_buffer", self.change_buffer),
            ("event_buffer", self.event_buffer),
        ] {
            if value == 0 {
                return Err(SyncError::Serialization(format!(
                    "{field} must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Load from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Key of the shared Track document.
    pub fn track_key(&self) -> Result<DocumentKey> {
        DocumentKey::parse(&self.track_document)
    }

    /// Key of the channel owned by `owner_id`.
    pub fn channel_key(&self, owner_id: &str) -> DocumentKey {
        DocumentKey::new(self.channels_collection.clone(), owner_id)
    }

    pub fn channel_defaults(&self) -> ChannelDefaults {
        ChannelDefaults {
            name: self.default_channel_name.clone(),
            track_uri: self.placeholder_track_uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.track_key().unwrap().to_string(), "tracks/now-playing");
        assert_eq!(config.channel_key("alice").to_string(), "channels/alice");
        assert_eq!(config.channel_defaults().name, "New");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SyncConfig::from_json_str(r#"{"default_channel_name": "Untitled"}"#).unwrap();
        assert_eq!(config.default_channel_name, "Untitled");
        assert_eq!(config.channels_collection, "channels");
        assert!(config.follow_track_on_start);
    }

    #[test]
    fn test_invalid_track_path_rejected() {
        let err = SyncConfig::from_json_str(r#"{"track_document": "now-playing"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_zero_buffers_rejected() {
        for json in [r#"{"change_buffer": 0}"#, r#"{"event_buffer": 0}"#] {
            let err = SyncConfig::from_json_str(json).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Serialization);
        }

        let config = SyncConfig {
            change_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"change_buffer": 16, "follow_track_on_start": false}}"#).unwrap();

        let config = SyncConfig::from_path(file.path()).unwrap();
        assert_eq!(config.change_buffer, 16);
        assert!(!config.follow_track_on_start);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = SyncConfig::from_path(dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
