//! Telegram Bot API sink
//!
//! URL media are passed to Telegram as strings so it fetches them itself;
//! decoded blobs are uploaded as multipart files.

use super::sink::{DeliveryError, MediaRef, OutgoingMedia, SendOptions, Sink, TextFormat};
use crate::error::redact_secrets;
use crate::protocol::MediaKind;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Telegram sink configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: "https://api.telegram.org".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct TelegramSink {
    config: TelegramConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct InputMedia {
    #[serde(rename = "type")]
    kind: &'static str,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

fn parse_mode(format: TextFormat) -> Option<&'static str> {
    match format {
        TextFormat::Plain => None,
        TextFormat::Markdown => Some("Markdown"),
        TextFormat::Html => Some("HTML"),
    }
}

fn media_type(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "photo",
        MediaKind::Video => "video",
    }
}

fn file_name(kind: MediaKind, index: usize) -> String {
    match kind {
        MediaKind::Image => format!("file{index}.jpg"),
        MediaKind::Video => format!("file{index}.mp4"),
    }
}

fn network_error(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Network(redact_secrets(&e.without_url().to_string()))
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Result<Self, DeliveryError> {
        if config.token.is_empty() {
            return Err(DeliveryError::NotConfigured(
                "Telegram bot token is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(network_error)?;

        Ok(Self { config, client })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.base_url.trim_end_matches('/'),
            self.config.token
        )
    }

    async fn check_reply(response: reqwest::Response) -> Result<(), DeliveryError> {
        let status = response.status();
        let reply = response.json::<TelegramReply>().await;
        match reply {
            Ok(reply) if status.is_success() && reply.ok => Ok(()),
            Ok(reply) => Err(DeliveryError::Rejected {
                status: status.as_u16(),
                description: reply
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
            Err(e) => Err(DeliveryError::Rejected {
                status: status.as_u16(),
                description: format!("unreadable reply: {}", e.without_url()),
            }),
        }
    }

    async fn call_json(&self, method: &str, body: Value) -> Result<(), DeliveryError> {
        debug!(method, "Telegram JSON request");
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        Self::check_reply(response).await
    }

    async fn call_multipart(&self, method: &str, form: Form) -> Result<(), DeliveryError> {
        debug!(method, "Telegram multipart request");
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;
        Self::check_reply(response).await
    }

    fn common_form(destination: &str, caption: Option<&str>, options: SendOptions) -> Form {
        let mut form = Form::new()
            .text("chat_id", destination.to_string())
            .text(
                "disable_notification",
                options.suppress_notification.to_string(),
            );
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
            if let Some(mode) = parse_mode(options.format) {
                form = form.text("parse_mode", mode);
            }
        }
        form
    }

    async fn send_single_media(
        &self,
        method: &str,
        kind: MediaKind,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        let field = media_type(kind);
        match media {
            MediaRef::Url(url) => {
                let mut body = json!({
                    "chat_id": destination,
                    "disable_notification": options.suppress_notification,
                });
                body[field] = json!(url);
                if let Some(caption) = caption {
                    body["caption"] = json!(caption);
                    if let Some(mode) = parse_mode(options.format) {
                        body["parse_mode"] = json!(mode);
                    }
                }
                self.call_json(method, body).await
            }
            MediaRef::Blob(bytes) => {
                let part = Part::bytes(bytes.clone()).file_name(file_name(kind, 0));
                let form = Self::common_form(destination, caption, options).part(field, part);
                self.call_multipart(method, form).await
            }
        }
    }
}

#[async_trait]
impl Sink for TelegramSink {
    async fn send_text(
        &self,
        destination: &str,
        body: &str,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        let mut request = json!({
            "chat_id": destination,
            "text": body,
            "disable_web_page_preview": options.suppress_preview,
            "disable_notification": options.suppress_notification,
        });
        if let Some(mode) = parse_mode(options.format) {
            request["parse_mode"] = json!(mode);
        }
        self.call_json("sendMessage", request).await
    }

    async fn send_photo(
        &self,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        self.send_single_media("sendPhoto", MediaKind::Image, destination, media, caption, options)
            .await
    }

    async fn send_video(
        &self,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        self.send_single_media("sendVideo", MediaKind::Video, destination, media, caption, options)
            .await
    }

    async fn send_media_group(
        &self,
        destination: &str,
        items: &[OutgoingMedia],
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        let mut uploads = Vec::new();
        let media: Vec<InputMedia> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let reference = match &item.media {
                    MediaRef::Url(url) => url.clone(),
                    MediaRef::Blob(bytes) => {
                        let name = format!("file{index}");
                        uploads.push((name.clone(), item.kind, index, bytes.clone()));
                        format!("attach://{name}")
                    }
                };
                InputMedia {
                    kind: media_type(item.kind),
                    media: reference,
                    parse_mode: item.caption.as_ref().and(parse_mode(options.format)),
                    caption: item.caption.clone(),
                }
            })
            .collect();

        let media_json = serde_json::to_string(&media)
            .map_err(|e| DeliveryError::InvalidMedia(e.to_string()))?;

        if uploads.is_empty() {
            return self
                .call_json(
                    "sendMediaGroup",
                    json!({
                        "chat_id": destination,
                        "media": media,
                        "disable_notification": options.suppress_notification,
                    }),
                )
                .await;
        }

        let mut form = Self::common_form(destination, None, options).text("media", media_json);
        for (name, kind, index, bytes) in uploads {
            form = form.part(name, Part::bytes(bytes).file_name(file_name(kind, index)));
        }
        self.call_multipart("sendMediaGroup", form).await
    }
}
