//! Transport layer for the hub connection
//!
//! This module provides the connection abstraction the connection manager
//! drives, a websocket implementation of it, and the one-shot HTTP fallback
//! publisher.
//!
//! ```
//! # tokio_test::block_on(async {
//! use hub2::testing::MockLink;
//! use hub2::transport::HubLink;
//!
//! let mut link = MockLink::default();
//! let recorder = link.recorder();
//! link.subscribe(&["news".to_string()]).await.unwrap();
//! assert_eq!(recorder.subscriptions(), vec![vec!["news".to_string()]]);
//! # });
//! ```

use crate::protocol::{self, Envelope};
use std::time::Duration;
use thiserror::Error;

pub mod http;
pub mod websocket;

pub use http::HttpPublisher;
pub use websocket::{WsConnector, WsLink};

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection closed: {0}")]
    Closed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("HTTP publish failed: {0}")]
    Http(String),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
}

/// One frame surfaced by a live link
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Text frame, expected to carry a JSON envelope
    Text(String),
    /// Any other data frame; described for logging only
    Other(String),
}

/// A live, exclusively owned connection to the hub
#[async_trait::async_trait]
pub trait HubLink: Send {
    /// Send one raw text frame
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError>;

    /// Wait for the next frame; `Ok(None)` means the hub closed the link
    async fn next_frame(&mut self) -> Result<Option<InboundFrame>, TransportError>;

    /// Close the link; errors are not interesting once we are leaving
    async fn close(&mut self);

    /// Serialize and send an envelope
    async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = protocol::serialize(envelope).map_err(TransportError::Serialization)?;
        self.send_text(frame).await
    }

    /// Ask the hub to add `topics` to this connection's subscriptions
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), TransportError> {
        self.send_envelope(&Envelope::subscribe(topics.to_vec()))
            .await
    }
}

/// Factory for hub links, called once per connection attempt
#[async_trait::async_trait]
pub trait HubConnector: Send + Sync {
    type Link: HubLink;

    async fn connect(&self) -> Result<Self::Link, TransportError>;
}
