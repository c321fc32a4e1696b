//! Per-recipient rendering (pure functions)
//!
//! Text bodies look like
//!
//! ```text
//! <attribution, group chats only>
//! # <topic>
//!
//! <data>
//! ```
//!
//! Media captions use the same header in HTML mode, followed by the
//! publisher's caption when there is one.

use super::sink::{MediaRef, OutgoingMedia, SendOptions, TextFormat};
use crate::protocol::{MediaPart, MediaSource, TextKind};
use crate::store::RecipientKey;
use base64::Engine as _;

/// Rendered text send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelivery {
    pub body: String,
    pub options: SendOptions,
}

pub fn text_format(kind: TextKind) -> TextFormat {
    match kind {
        TextKind::Plain | TextKind::Json => TextFormat::Plain,
        TextKind::Markdown => TextFormat::Markdown,
        TextKind::Html => TextFormat::Html,
    }
}

/// Explicit preference wins; HTML and JSON suppress previews by default
pub fn suppress_preview(kind: TextKind, preview: Option<bool>) -> bool {
    match preview {
        Some(preview) => !preview,
        None => matches!(kind, TextKind::Html | TextKind::Json),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escape the characters legacy Telegram Markdown treats as markup
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape text placed inside a Markdown link label, where `]` ends the label
fn escape_markdown_label(text: &str) -> String {
    escape_markdown(text).replace(']', "\\]")
}

fn escape(text: &str, format: TextFormat) -> String {
    match format {
        TextFormat::Plain => text.to_string(),
        TextFormat::Markdown => escape_markdown(text),
        TextFormat::Html => escape_html(text),
    }
}

/// Mention of the recipient's originator
pub fn attribution(key: &RecipientKey, format: TextFormat) -> String {
    let name = key.display_name();
    let id = key.originator_id();
    match format {
        TextFormat::Plain => name.to_string(),
        TextFormat::Markdown => format!("[{}](tg://user?id={id})", escape_markdown_label(name)),
        TextFormat::Html => format!("<a href=\"tg://user?id={id}\">{}</a>", escape_html(name)),
    }
}

/// Attribution (group chats) and topic header lines
fn header(key: &RecipientKey, topic: &str, format: TextFormat) -> String {
    let topic_line = format!("# {}", escape(topic, format));
    if key.is_group() {
        format!("{}\n{topic_line}", attribution(key, format))
    } else {
        topic_line
    }
}

fn options_for(key: &RecipientKey, format: TextFormat, suppress_preview: bool) -> SendOptions {
    SendOptions {
        format,
        suppress_preview,
        suppress_notification: key.is_group(),
    }
}

pub fn render_text(
    key: &RecipientKey,
    topic: &str,
    kind: TextKind,
    data: &str,
    preview: Option<bool>,
) -> TextDelivery {
    let format = text_format(kind);
    TextDelivery {
        body: format!("{}\n\n{data}", header(key, topic, format)),
        options: options_for(key, format, suppress_preview(kind, preview)),
    }
}

/// Options for media sends: HTML captions, notification by context
pub fn media_options(key: &RecipientKey) -> SendOptions {
    options_for(key, TextFormat::Html, false)
}

/// Caption for a single media send or the first item of a group
pub fn media_caption(key: &RecipientKey, topic: &str, caption: Option<&str>) -> String {
    let header = header(key, topic, TextFormat::Html);
    match caption {
        Some(caption) if !caption.is_empty() => format!("{header}\n\n{}", escape_html(caption)),
        _ => header,
    }
}

/// Items for a grouped send, preserving input order
pub fn media_group(
    key: &RecipientKey,
    topic: &str,
    parts: &[(MediaPart<'_>, MediaRef)],
) -> Vec<OutgoingMedia> {
    parts
        .iter()
        .enumerate()
        .map(|(index, (part, media))| OutgoingMedia {
            kind: part.kind,
            media: media.clone(),
            caption: if index == 0 {
                Some(media_caption(key, topic, part.caption))
            } else {
                part.caption.map(escape_html)
            },
        })
        .collect()
}

/// URLs pass through; everything else is base64 to decode
pub fn resolve_media(source: &MediaSource<'_>) -> Result<MediaRef, base64::DecodeError> {
    match source {
        MediaSource::Url(url) => Ok(MediaRef::Url(url.to_string())),
        MediaSource::Base64(data) => base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map(MediaRef::Blob),
    }
}
