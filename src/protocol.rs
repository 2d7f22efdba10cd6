//! Message contract between the UI layer and the sync core.
//!
//! Both directions are JSON objects tagged by name, with the payload (if
//! any) under `data`:
//! ```text
//! {"tag": "Broadcast", "data": "spotify:track:4uLU6hMCjMI75M1A2tKUQC"}
//! {"tag": "GetChannels"}
//! {"tag": "NewTrack",  "data": "spotify:track:4uLU6hMCjMI75M1A2tKUQC"}
//! ```
//!
//! Inbound tags the core does not know decode to [`Command::Unknown`] so the
//! router can report and skip them. A known tag with a missing or mistyped
//! payload is a decode error.

use crate::error::{Result, SyncError};
use crate::types::{ChannelDraft, ChannelSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// UI → core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "tag", content = "data")]
pub enum Command {
    /// Forward an error message to the diagnostic sink.
    LogError(String),
    /// Start the external sign-in exchange.
    SignInToFirebase,
    /// Set the shared now-playing track uri.
    Broadcast(String),
    /// Watch the channel list.
    GetChannels,
    /// Write the caller's own channel.
    CreateOrUpdateChannel(ChannelDraft),
    /// Follow the now-playing track of the given channel.
    ChangeChannel(String),
    /// Watch the given channel.
    GetUserChannel(String),
    /// A tag this core does not handle.
    #[serde(skip)]
    Unknown(String),
}

#[derive(Deserialize)]
struct RawMessage {
    tag: String,
    #[serde(default)]
    data: Value,
}

fn malformed(tag: &str, detail: impl std::fmt::Display) -> SyncError {
    SyncError::MalformedCommand(format!("{tag}: {detail}"))
}

fn string_data(tag: &str, data: Value) -> Result<String> {
    match data {
        Value::String(s) => Ok(s),
        Value::Null => Err(malformed(tag, "missing data")),
        other => Err(malformed(tag, format!("data must be a string, got {other}"))),
    }
}

impl Command {
    /// Decode a JSON command.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| SyncError::MalformedCommand(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let RawMessage { tag, data } = serde_json::from_value(value)
            .map_err(|e| SyncError::MalformedCommand(e.to_string()))?;

        let command = match tag.as_str() {
            "LogError" => Command::LogError(string_data(&tag, data)?),
            "SignInToFirebase" => Command::SignInToFirebase,
            "Broadcast" => Command::Broadcast(string_data(&tag, data)?),
            "GetChannels" => Command::GetChannels,
            "CreateOrUpdateChannel" => {
                if data.is_null() {
                    return Err(malformed(&tag, "missing data"));
                }
                let draft = serde_json::from_value(data).map_err(|e| malformed(&tag, e))?;
                Command::CreateOrUpdateChannel(draft)
            }
            "ChangeChannel" => Command::ChangeChannel(string_data(&tag, data)?),
            "GetUserChannel" => Command::GetUserChannel(string_data(&tag, data)?),
            _ => Command::Unknown(tag),
        };
        Ok(command)
    }

    /// Encode as JSON. `Unknown` has no wire form.
    pub fn to_json(&self) -> Result<String> {
        if let Command::Unknown(tag) = self {
            return Err(malformed(tag, "unknown commands cannot be encoded"));
        }
        Ok(serde_json::to_string(self)?)
    }

    pub fn tag(&self) -> &str {
        match self {
            Command::LogError(_) => "LogError",
            Command::SignInToFirebase => "SignInToFirebase",
            Command::Broadcast(_) => "Broadcast",
            Command::GetChannels => "GetChannels",
            Command::CreateOrUpdateChannel(_) => "CreateOrUpdateChannel",
            Command::ChangeChannel(_) => "ChangeChannel",
            Command::GetUserChannel(_) => "GetUserChannel",
            Command::Unknown(tag) => tag,
        }
    }
}

/// Core → UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "data")]
pub enum Event {
    /// The followed track changed.
    NewTrack(String),
    /// The signed-in user's channel (defaults applied).
    NewUser(ChannelSummary),
    /// Every channel, ordered by name.
    AllChannels(Vec<ChannelSummary>),
    /// The channel opened with `GetUserChannel` changed.
    UpdateUserChannel(ChannelSummary),
}

impl Event {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON event; unknown tags are rejected.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Event::NewTrack(_) => "NewTrack",
            Event::NewUser(_) => "NewUser",
            Event::AllChannels(_) => "AllChannels",
            Event::UpdateUserChannel(_) => "UpdateUserChannel",
        }
    }
}
