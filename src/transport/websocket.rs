//! Websocket hub link using tokio-tungstenite
//!
//! The connect handshake is bounded by a total timeout. Once connected the
//! link pings the hub every heartbeat interval and gives up when nothing at
//! all has arrived for two intervals.

use super::{HubConnector, HubLink, InboundFrame, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens websocket links to the hub
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    connect_timeout: Duration,
    heartbeat: Duration,
}

impl WsConnector {
    pub fn new(url: &str, connect_timeout: Duration, heartbeat: Duration) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => {}
            _ => return Err(TransportError::InvalidUrl(url.to_string())),
        }
        Ok(Self {
            url,
            connect_timeout,
            heartbeat,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HubConnector for WsConnector {
    type Link = WsLink;

    async fn connect(&self) -> Result<WsLink, TransportError> {
        let (stream, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!(url = %self.url, status = %response.status(), "Connected to hub");
        Ok(WsLink::new(stream, self.heartbeat))
    }
}

/// Live websocket connection to the hub
pub struct WsLink {
    stream: WsStream,
    heartbeat: Duration,
    ticker: Interval,
    last_seen: Instant,
}

impl WsLink {
    fn new(stream: WsStream, heartbeat: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            stream,
            heartbeat,
            ticker,
            last_seen: Instant::now(),
        }
    }

    fn idle_limit(&self) -> Duration {
        self.heartbeat * 2
    }
}

#[async_trait]
impl HubLink for WsLink {
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_frame(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        // Time the caller spent between reads is not hub silence
        self.last_seen = Instant::now();
        self.ticker.reset();
        loop {
            tokio::select! {
                message = self.stream.next() => {
                    let message = match message {
                        None => return Ok(None),
                        Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                        Some(Ok(message)) => message,
                    };
                    self.last_seen = Instant::now();
                    match message {
                        Message::Text(text) => return Ok(Some(InboundFrame::Text(text))),
                        Message::Binary(bytes) => {
                            return Ok(Some(InboundFrame::Other(format!(
                                "binary frame ({} bytes)",
                                bytes.len()
                            ))));
                        }
                        Message::Ping(_) => {
                            // Push out the queued pong
                            self.stream
                                .flush()
                                .await
                                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                        }
                        Message::Pong(_) | Message::Frame(_) => {}
                        Message::Close(frame) => {
                            debug!(?frame, "Hub sent close frame");
                            return Ok(None);
                        }
                    }
                }
                _ = self.ticker.tick() => {
                    if self.last_seen.elapsed() >= self.idle_limit() {
                        return Err(TransportError::Timeout(self.idle_limit()));
                    }
                    self.stream
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Ignoring error while closing hub link: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_urls() {
        let timeout = Duration::from_secs(1);
        assert!(WsConnector::new("wss://hub.drink.cafe/ws", timeout, timeout).is_ok());
        assert!(WsConnector::new("ws://localhost:8080/ws", timeout, timeout).is_ok());
        assert!(matches!(
            WsConnector::new("https://hub.drink.cafe/http", timeout, timeout),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            WsConnector::new("not a url", timeout, timeout),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
