//! Envelope codec
//!
//! Pure functions that turn raw hub frames into typed values and back.
//! Media payloads are only classified here; decoding happens at dispatch.

use super::messages::{Envelope, MessageBody, PayloadKind, PublishedMessage};
use serde_json::Value;
use thiserror::Error;

/// Inbound frame could not be understood
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
    #[error("Unknown envelope action: {0}")]
    UnknownAction(String),
}

/// Extended items mix media with non-media kinds
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifyError {
    #[error("Extended items must all be media, found {kind} at position {position}")]
    MixedMedia { position: usize, kind: PayloadKind },
}

/// A parsed inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Message published on a topic this connection is subscribed to
    Message(PublishedMessage),
    /// Raw envelope (the hub echoing a request)
    Envelope(Envelope),
}

/// Text-like formatting family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Plain,
    Markdown,
    Html,
    Json,
}

/// Media flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Where a media item's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource<'a> {
    /// Remote reference the sink can pass through
    Url(&'a str),
    /// Base64 text still to be decoded
    Base64(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart<'a> {
    pub kind: MediaKind,
    pub source: MediaSource<'a>,
    pub caption: Option<&'a str>,
}

/// Typed classification of a message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'a> {
    Text { kind: TextKind, data: &'a str },
    /// Primary item first, then extended items in input order
    Media(Vec<MediaPart<'a>>),
    Unsupported(&'a str),
}

/// Parse one raw text frame
pub fn parse(raw: &str) -> Result<Frame, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ParseError::Malformed("frame is not a JSON object".to_string()))?;
    let frame_type = object.get("type").map(|t| t.as_str().map(str::to_string));
    let action = object
        .get("action")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(frame_type) = frame_type {
        return match frame_type.as_deref() {
            Some("MESSAGE") => serde_json::from_value::<PublishedMessage>(value)
                .map(Frame::Message)
                .map_err(|e| ParseError::Malformed(e.to_string())),
            Some(other) => Err(ParseError::UnknownType(other.to_string())),
            None => Err(ParseError::Malformed("`type` must be a string".to_string())),
        };
    }

    match action.as_deref() {
        Some("PUB") | Some("SUB") => serde_json::from_value::<Envelope>(value)
            .map(Frame::Envelope)
            .map_err(|e| ParseError::Malformed(e.to_string())),
        Some(other) => Err(ParseError::UnknownAction(other.to_string())),
        None => Err(ParseError::Malformed(
            "frame has neither `type` nor `action`".to_string(),
        )),
    }
}

/// Serialize an outbound envelope
pub fn serialize(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

fn media_source(data: &str) -> MediaSource<'_> {
    if data.starts_with("http://") || data.starts_with("https://") {
        MediaSource::Url(data)
    } else {
        MediaSource::Base64(data)
    }
}

fn media_kind(kind: &PayloadKind) -> Option<MediaKind> {
    match kind {
        PayloadKind::Image => Some(MediaKind::Image),
        PayloadKind::Video => Some(MediaKind::Video),
        _ => None,
    }
}

/// Classify a body into text, media or unsupported
pub fn classify(body: &MessageBody) -> Result<Payload<'_>, ClassifyError> {
    if !body.extended_items.is_empty() {
        let primary = media_kind(&body.kind).ok_or_else(|| ClassifyError::MixedMedia {
            position: 0,
            kind: body.kind.clone(),
        })?;
        let mut parts = vec![MediaPart {
            kind: primary,
            source: media_source(&body.data),
            caption: body.caption.as_deref(),
        }];
        for (index, item) in body.extended_items.iter().enumerate() {
            let kind = media_kind(&item.kind).ok_or_else(|| ClassifyError::MixedMedia {
                position: index + 1,
                kind: item.kind.clone(),
            })?;
            parts.push(MediaPart {
                kind,
                source: media_source(&item.data),
                caption: item.caption.as_deref(),
            });
        }
        return Ok(Payload::Media(parts));
    }

    let payload = match &body.kind {
        PayloadKind::Plain => Payload::Text {
            kind: TextKind::Plain,
            data: &body.data,
        },
        PayloadKind::Markdown => Payload::Text {
            kind: TextKind::Markdown,
            data: &body.data,
        },
        PayloadKind::Html => Payload::Text {
            kind: TextKind::Html,
            data: &body.data,
        },
        PayloadKind::Json => Payload::Text {
            kind: TextKind::Json,
            data: &body.data,
        },
        PayloadKind::Image => Payload::Media(vec![MediaPart {
            kind: MediaKind::Image,
            source: media_source(&body.data),
            caption: body.caption.as_deref(),
        }]),
        PayloadKind::Video => Payload::Media(vec![MediaPart {
            kind: MediaKind::Video,
            source: media_source(&body.data),
            caption: body.caption.as_deref(),
        }]),
        PayloadKind::Unknown(kind) => Payload::Unsupported(kind),
    };
    Ok(payload)
}
