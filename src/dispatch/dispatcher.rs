//! Fan-out of published messages to interested recipients

use super::render::{self, TextDelivery};
use super::sink::{DeliveryError, MediaRef, Sink};
use crate::error::{redact_secrets, BridgeResult};
use crate::protocol::{
    classify, ClassifyError, MediaKind, MediaPart, Payload, PublishedMessage, TextKind,
    GLOBAL_TOPIC,
};
use crate::store::{RecipientKey, SubscriptionStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Why a message produced no deliveries at all
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    GlobalTopic,
    MixedMedia(ClassifyError),
    UnsupportedKind(String),
    InvalidMedia(String),
}

/// Counts for one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    Delivered(DeliveryReport),
}

/// Payload work shared by every recipient
enum Prepared<'a> {
    Text { kind: TextKind, data: &'a str },
    Media(Vec<(MediaPart<'a>, MediaRef)>),
}

/// Delivers hub messages to every recipient subscribed to their topic
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    sink: Arc<dyn Sink>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SubscriptionStore>, sink: Arc<dyn Sink>) -> Self {
        Self { store, sink }
    }

    /// Dispatch one published message
    ///
    /// Only a store failure is an error; malformed payloads are skipped and
    /// per-recipient delivery failures are logged and counted.
    pub async fn dispatch(&self, message: &PublishedMessage) -> BridgeResult<DispatchOutcome> {
        let span = crate::dispatch_span!(
            topic = %message.topic,
            kind = %message.message.kind
        );
        self.dispatch_inner(message).instrument(span).await
    }

    async fn dispatch_inner(&self, message: &PublishedMessage) -> BridgeResult<DispatchOutcome> {
        let topic = message.topic.as_str();
        if topic == GLOBAL_TOPIC {
            debug!("Ignoring message on the global topic");
            return Ok(DispatchOutcome::Skipped(SkipReason::GlobalTopic));
        }

        let prepared = match Self::prepare(message) {
            Ok(prepared) => prepared,
            Err(reason) => return Ok(DispatchOutcome::Skipped(reason)),
        };

        let recipients: Vec<RecipientKey> = self
            .store
            .key_topics_map()?
            .into_iter()
            .filter(|(_, topics)| topics.iter().any(|t| t == topic))
            .map(|(key, _)| key)
            .collect();

        let mut report = DeliveryReport {
            matched: recipients.len(),
            ..Default::default()
        };
        for key in &recipients {
            match self.deliver(key, topic, &prepared, message.message.preview).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        recipient = %key,
                        error = %redact_secrets(&e.to_string()),
                        "Delivery failed"
                    );
                }
            }
        }

        info!(
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "Message dispatched"
        );
        Ok(DispatchOutcome::Delivered(report))
    }

    fn prepare(message: &PublishedMessage) -> Result<Prepared<'_>, SkipReason> {
        match classify(&message.message) {
            Err(e) => {
                warn!(error = %e, "Rejecting message with mixed extended items");
                Err(SkipReason::MixedMedia(e))
            }
            Ok(Payload::Unsupported(kind)) => {
                warn!(kind, "Unsupported message kind, not delivering");
                Err(SkipReason::UnsupportedKind(kind.to_string()))
            }
            Ok(Payload::Text { kind, data }) => Ok(Prepared::Text { kind, data }),
            Ok(Payload::Media(parts)) => {
                let mut resolved = Vec::with_capacity(parts.len());
                for part in parts {
                    match render::resolve_media(&part.source) {
                        Ok(media) => resolved.push((part, media)),
                        Err(e) => {
                            warn!(error = %e, "Media data is neither a URL nor valid base64");
                            return Err(SkipReason::InvalidMedia(e.to_string()));
                        }
                    }
                }
                Ok(Prepared::Media(resolved))
            }
        }
    }

    async fn deliver(
        &self,
        key: &RecipientKey,
        topic: &str,
        prepared: &Prepared<'_>,
        preview: Option<bool>,
    ) -> Result<(), DeliveryError> {
        let destination = key.destination_id();
        match prepared {
            Prepared::Text { kind, data } => {
                let TextDelivery { body, options } =
                    render::render_text(key, topic, *kind, data, preview);
                self.sink.send_text(destination, &body, options).await
            }
            Prepared::Media(parts) => {
                let options = render::media_options(key);
                match parts.as_slice() {
                    [] => Err(DeliveryError::InvalidMedia("no media items".to_string())),
                    [(part, media)] => {
                        let caption = render::media_caption(key, topic, part.caption);
                        match part.kind {
                            MediaKind::Image => {
                                self.sink
                                    .send_photo(destination, media, Some(&caption), options)
                                    .await
                            }
                            MediaKind::Video => {
                                self.sink
                                    .send_video(destination, media, Some(&caption), options)
                                    .await
                            }
                        }
                    }
                    many => {
                        let items = render::media_group(key, topic, many);
                        self.sink
                            .send_media_group(destination, &items, options)
                            .await
                    }
                }
            }
        }
    }
}
