//! Delivery capability consumed by the dispatcher

use crate::protocol::MediaKind;
use async_trait::async_trait;
use thiserror::Error;

/// Formatting mode for text and captions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
    Html,
}

/// Per-send delivery hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    pub format: TextFormat,
    pub suppress_preview: bool,
    pub suppress_notification: bool,
}

/// Media content handed to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Url(String),
    Blob(Vec<u8>),
}

/// One item of a grouped media send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub media: MediaRef,
    pub caption: Option<String>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    Network(String),
    #[error("Delivery rejected ({status}): {description}")]
    Rejected { status: u16, description: String },
    #[error("Invalid media: {0}")]
    InvalidMedia(String),
    #[error("Sink not configured: {0}")]
    NotConfigured(String),
}

/// Delivery target for rendered messages
///
/// Each call covers one destination; failures are reported to the caller
/// and never retried here.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send_text(
        &self,
        destination: &str,
        body: &str,
        options: SendOptions,
    ) -> Result<(), DeliveryError>;

    async fn send_photo(
        &self,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError>;

    async fn send_video(
        &self,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError>;

    async fn send_media_group(
        &self,
        destination: &str,
        items: &[OutgoingMedia],
        options: SendOptions,
    ) -> Result<(), DeliveryError>;
}
