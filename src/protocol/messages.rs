//! Wire message types exchanged with the hub
//!
//! This module defines the envelope sent to the hub (publish/subscribe
//! requests), the notification the hub pushes for each published message,
//! and the closed set of payload kinds.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Topic that every hub connection is implicitly subscribed to.
///
/// Messages published here are never fanned out to recipients.
pub const GLOBAL_TOPIC: &str = "global";

/// Envelope action understood by the hub
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    #[serde(rename = "PUB")]
    Publish,
    #[serde(rename = "SUB")]
    Subscribe,
}

/// Payload kind carried in `message.type`
///
/// Unrecognized strings are kept as [`PayloadKind::Unknown`] so a single
/// publisher using a newer kind cannot break parsing of the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PayloadKind {
    Plain,
    Markdown,
    Html,
    Json,
    Image,
    Video,
    Unknown(String),
}

impl PayloadKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            PayloadKind::Plain => "PLAIN",
            PayloadKind::Markdown => "MARKDOWN",
            PayloadKind::Html => "HTML",
            PayloadKind::Json => "JSON",
            PayloadKind::Image => "MEDIA-IMAGE",
            PayloadKind::Video => "MEDIA-VIDEO",
            PayloadKind::Unknown(other) => other,
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(self, PayloadKind::Image | PayloadKind::Video)
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            PayloadKind::Plain | PayloadKind::Markdown | PayloadKind::Html | PayloadKind::Json
        )
    }
}

impl From<String> for PayloadKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PLAIN" => PayloadKind::Plain,
            "MARKDOWN" => PayloadKind::Markdown,
            "HTML" => PayloadKind::Html,
            "JSON" => PayloadKind::Json,
            // PHOTO/VIDEO are the names older publishers still send
            "MEDIA-IMAGE" | "PHOTO" => PayloadKind::Image,
            "MEDIA-VIDEO" | "VIDEO" => PayloadKind::Video,
            _ => PayloadKind::Unknown(value),
        }
    }
}

impl From<PayloadKind> for String {
    fn from(kind: PayloadKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional media item attached to a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtendedItem {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    #[serde(deserialize_with = "data_as_string")]
    pub data: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Message body shared by outbound publish requests and inbound notifications
///
/// # Examples
/// ```
/// use hub2::protocol::{MessageBody, PayloadKind};
///
/// let body = MessageBody::new(PayloadKind::Markdown, "*hello*").with_caption("greeting");
/// assert_eq!(body.kind, PayloadKind::Markdown);
/// assert_eq!(body.caption.as_deref(), Some("greeting"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageBody {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    #[serde(deserialize_with = "data_as_string")]
    pub data: String,
    #[serde(default)]
    pub caption: Option<String>,
    /// Explicit link-preview preference; `None` falls back to the kind default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,
    #[serde(rename = "extended_data", default, deserialize_with = "null_as_empty")]
    pub extended_items: Vec<ExtendedItem>,
}

impl MessageBody {
    pub fn new(kind: PayloadKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            caption: None,
            preview: None,
            extended_items: Vec::new(),
        }
    }

    /// Build a media body from raw bytes, base64-encoding them for the wire
    pub fn media_blob(kind: PayloadKind, bytes: &[u8]) -> Self {
        use base64::Engine as _;
        Self::new(kind, base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn with_extended(mut self, items: Vec<ExtendedItem>) -> Self {
        self.extended_items = items;
        self
    }
}

/// Envelope sent to the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub action: Action,
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,
}

impl Envelope {
    /// Publish request; an empty topic list targets the global topic
    pub fn publish(topics: Vec<String>, message: MessageBody) -> Self {
        let topics = if topics.is_empty() {
            vec![GLOBAL_TOPIC.to_string()]
        } else {
            topics
        };
        Self {
            action: Action::Publish,
            topics,
            message: Some(message),
        }
    }

    /// Subscribe request for exactly `topics`
    pub fn subscribe(topics: Vec<String>) -> Self {
        Self {
            action: Action::Subscribe,
            topics,
            message: None,
        }
    }
}

/// Notification pushed by the hub for every message on a subscribed topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub message: MessageBody,
}

/// An explicit `null` list reads the same as an absent one
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Publishers may send structured `data`; anything that is not already a
/// string is carried as its compact JSON text.
fn data_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_aliases() {
        assert_eq!(PayloadKind::from("PHOTO".to_string()), PayloadKind::Image);
        assert_eq!(PayloadKind::from("VIDEO".to_string()), PayloadKind::Video);
        assert_eq!(
            PayloadKind::from("MEDIA-IMAGE".to_string()),
            PayloadKind::Image
        );
        assert_eq!(
            PayloadKind::from("STICKER".to_string()),
            PayloadKind::Unknown("STICKER".to_string())
        );
    }

    #[test]
    fn test_kind_predicates() {
        assert!(PayloadKind::Image.is_media());
        assert!(!PayloadKind::Image.is_text());
        assert!(PayloadKind::Json.is_text());
        assert!(!PayloadKind::Unknown("X".into()).is_text());
        assert!(!PayloadKind::Unknown("X".into()).is_media());
    }

    #[test]
    fn test_structured_data_is_stringified() {
        let body: MessageBody =
            serde_json::from_value(json!({"type": "JSON", "data": {"key": "value"}})).unwrap();
        assert_eq!(body.data, r#"{"key":"value"}"#);
        assert!(body.extended_items.is_empty());
        assert_eq!(body.caption, None);
    }

    #[test]
    fn test_publish_defaults_to_global_topic() {
        let envelope = Envelope::publish(vec![], MessageBody::new(PayloadKind::Plain, "hi"));
        assert_eq!(envelope.topics, vec![GLOBAL_TOPIC]);
        assert_eq!(envelope.action, Action::Publish);
    }

    #[test]
    fn test_subscribe_envelope_shape() {
        let envelope = Envelope::subscribe(vec!["news".into()]);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({"action": "SUB", "topics": ["news"]}));
    }

    #[test]
    fn test_media_blob_is_base64() {
        let body = MessageBody::media_blob(PayloadKind::Image, b"\x89PNG");
        assert_eq!(body.data, "iVBORw==");
    }
}
