//! One-shot HTTP publish, for callers without a live websocket

use super::TransportError;
use crate::protocol::{Action, Envelope};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// Posts publish envelopes to the hub's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    endpoint: String,
    client: Client,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint).map_err(|_| TransportError::InvalidUrl(endpoint.clone()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { endpoint, client })
    }

    /// Publish and return the hub's JSON reply
    pub async fn publish(&self, envelope: &Envelope) -> Result<Value, TransportError> {
        if envelope.action != Action::Publish {
            return Err(TransportError::Http(
                "only publish envelopes can be sent over HTTP".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("hub returned {status}: {body}")));
        }

        let reply = response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        info!(topics = ?envelope.topics, "Published over HTTP");
        Ok(reply)
    }
}
