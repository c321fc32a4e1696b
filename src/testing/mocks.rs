//! Mock implementations for testing
//!
//! Provides a recording sink and a scripted hub link/connector so the
//! dispatcher, reconciler and connection manager can be exercised without a
//! hub or the Telegram API.

use crate::dispatch::{DeliveryError, MediaRef, OutgoingMedia, SendOptions, Sink};
use crate::protocol::Envelope;
use crate::transport::{HubConnector, HubLink, InboundFrame, TransportError};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One call received by [`MockSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Text {
        destination: String,
        body: String,
        options: SendOptions,
    },
    Photo {
        destination: String,
        media: MediaRef,
        caption: Option<String>,
        options: SendOptions,
    },
    Video {
        destination: String,
        media: MediaRef,
        caption: Option<String>,
        options: SendOptions,
    },
    MediaGroup {
        destination: String,
        items: Vec<OutgoingMedia>,
        options: SendOptions,
    },
}

impl SinkCall {
    pub fn destination(&self) -> &str {
        match self {
            SinkCall::Text { destination, .. }
            | SinkCall::Photo { destination, .. }
            | SinkCall::Video { destination, .. }
            | SinkCall::MediaGroup { destination, .. } => destination,
        }
    }
}

/// Recording sink; calls to destinations marked failing are recorded and
/// then rejected
#[derive(Debug, Default)]
pub struct MockSink {
    calls: Mutex<Vec<SinkCall>>,
    failing: Mutex<HashSet<String>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `destination` fail
    pub fn fail_for(&self, destination: impl Into<String>) {
        lock(&self.failing).insert(destination.into());
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.calls).clone()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.destination().to_string())
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: SinkCall) -> Result<(), DeliveryError> {
        let destination = call.destination().to_string();
        lock(&self.calls).push(call);
        if lock(&self.failing).contains(&destination) {
            return Err(DeliveryError::Rejected {
                status: 403,
                description: format!("mock failure for {destination}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for MockSink {
    async fn send_text(
        &self,
        destination: &str,
        body: &str,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        self.record(SinkCall::Text {
            destination: destination.to_string(),
            body: body.to_string(),
            options,
        })
    }

    async fn send_photo(
        &self,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        self.record(SinkCall::Photo {
            destination: destination.to_string(),
            media: media.clone(),
            caption: caption.map(str::to_string),
            options,
        })
    }

    async fn send_video(
        &self,
        destination: &str,
        media: &MediaRef,
        caption: Option<&str>,
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        self.record(SinkCall::Video {
            destination: destination.to_string(),
            media: media.clone(),
            caption: caption.map(str::to_string),
            options,
        })
    }

    async fn send_media_group(
        &self,
        destination: &str,
        items: &[OutgoingMedia],
        options: SendOptions,
    ) -> Result<(), DeliveryError> {
        self.record(SinkCall::MediaGroup {
            destination: destination.to_string(),
            items: items.to_vec(),
            options,
        })
    }
}

/// One step of a [`MockLink`] script
#[derive(Debug, Clone)]
pub enum ScriptedFrame {
    Frame(InboundFrame),
    /// Fail the read with `ReceiveFailed`
    Fail(String),
    /// The hub closes the link
    Close,
}

impl ScriptedFrame {
    pub fn text(raw: impl Into<String>) -> Self {
        ScriptedFrame::Frame(InboundFrame::Text(raw.into()))
    }
}

/// Observes a [`MockLink`] after it has been handed to the code under test
#[derive(Debug, Clone, Default)]
pub struct LinkRecorder {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl LinkRecorder {
    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Sent frames that decode as envelopes
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Topic lists of every SUB envelope sent, in order
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        self.sent_envelopes()
            .into_iter()
            .filter(|envelope| envelope.action == crate::protocol::Action::Subscribe)
            .map(|envelope| envelope.topics)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Scripted hub link
///
/// Plays its script in order; once the script is exhausted `next_frame`
/// blocks forever, like an idle but healthy connection.
#[derive(Debug, Default)]
pub struct MockLink {
    script: VecDeque<ScriptedFrame>,
    recorder: LinkRecorder,
    fail_sends: bool,
}

impl MockLink {
    pub fn new(script: Vec<ScriptedFrame>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    /// A link that delivers the given text frames and then idles
    pub fn with_text_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(frames.into_iter().map(ScriptedFrame::text).collect())
    }

    /// Make every send fail
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn recorder(&self) -> LinkRecorder {
        self.recorder.clone()
    }
}

#[async_trait]
impl HubLink for MockLink {
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        lock(&self.recorder.sent).push(frame);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        match self.script.pop_front() {
            Some(ScriptedFrame::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptedFrame::Fail(reason)) => Err(TransportError::ReceiveFailed(reason)),
            Some(ScriptedFrame::Close) => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.recorder.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out pre-built links, one per connection attempt
///
/// Attempts beyond the queued ones fail with `ConnectFailed`.
#[derive(Debug, Default)]
pub struct MockConnector {
    queue: Mutex<VecDeque<Result<MockLink, String>>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new(links: Vec<MockLink>) -> Self {
        let connector = Self::default();
        for link in links {
            connector.push_link(link);
        }
        connector
    }

    pub fn push_link(&self, link: MockLink) {
        lock(&self.queue).push_back(Ok(link));
    }

    pub fn push_failure(&self, reason: impl Into<String>) {
        lock(&self.queue).push_back(Err(reason.into()));
    }

    /// Number of `connect` calls so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubConnector for MockConnector {
    type Link = MockLink;

    async fn connect(&self) -> Result<MockLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.queue).pop_front();
        match next {
            Some(Ok(link)) => Ok(link),
            Some(Err(reason)) => Err(TransportError::ConnectFailed(reason)),
            None => Err(TransportError::ConnectFailed(
                "no scripted links left".to_string(),
            )),
        }
    }
}
