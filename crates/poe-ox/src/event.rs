use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PoeRequestError;

/// One framed server-sent event as read from the wire.
///
/// `data` is opaque at this level; decode it with the typed helpers once
/// [`SseEvent::kind`] says what to expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_label(&self.event)
    }

    /// Decode the payload of a `text`, `replace_response` or `suggested_reply` event
    pub fn partial_response(&self) -> Result<PartialResponse, PoeRequestError> {
        self.decode()
    }

    pub fn meta(&self) -> Result<MetaEvent, PoeRequestError> {
        self.decode()
    }

    pub fn error_payload(&self) -> Result<ErrorEvent, PoeRequestError> {
        self.decode()
    }

    pub fn file(&self) -> Result<FileEvent, PoeRequestError> {
        self.decode()
    }

    /// Decode a `json` event's payload as a raw value
    pub fn json(&self) -> Result<Value, PoeRequestError> {
        self.decode()
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, PoeRequestError> {
        serde_json::from_str(&self.data).map_err(|e| {
            PoeRequestError::InvalidEventData(format!("{} payload: {e}", self.event))
        })
    }
}

/// Closed set of event labels emitted by Poe bots
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Text,
    ReplaceResponse,
    SuggestedReply,
    Meta,
    Json,
    File,
    Error,
    Done,
    #[strum(disabled)]
    Unrecognized(String),
}

impl EventKind {
    pub fn from_label(label: &str) -> Self {
        label
            .parse()
            .unwrap_or_else(|_| Self::Unrecognized(label.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::ReplaceResponse => "replace_response",
            Self::SuggestedReply => "suggested_reply",
            Self::Meta => "meta",
            Self::Json => "json",
            Self::File => "file",
            Self::Error => "error",
            Self::Done => "done",
            Self::Unrecognized(label) => label,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `text`, `replace_response` and `suggested_reply`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_suggested_reply: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_replace_response: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub refetch_settings: bool,
    #[serde(default)]
    pub linkify: bool,
    #[serde(default)]
    pub suggested_replies: bool,
}

/// Payload of an `error` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub allow_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub url: String,
    pub content_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_ref: Option<String>,
}
