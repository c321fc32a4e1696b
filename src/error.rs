//! Error types for the hub bridge
//!
//! Each layer owns its own error enum; [`BridgeError`] composes them and
//! classifies each failure for the reconnect loop.

use crate::config::ConfigError;
use crate::protocol::ParseError;
use crate::store::PersistenceError;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Subscription drift detected: {stale} stale topics exceed threshold {threshold}")]
    DriftDetected { stale: usize, threshold: usize },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the reconnect loop reacts to a failed connection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Deliberate close; reconnect right away
    Resync,
    /// Anything else; back off before reconnecting
    Transient,
}

impl BridgeError {
    pub fn drift_detected(stale: usize, threshold: usize) -> Self {
        Self::DriftDetected { stale, threshold }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            BridgeError::DriftDetected { .. } => ErrorClass::Resync,
            BridgeError::Parse(_)
            | BridgeError::Transport(_)
            | BridgeError::Persistence(_)
            | BridgeError::Config(_)
            | BridgeError::Serialization(_) => ErrorClass::Transient,
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

static BOT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bot\d+:[A-Za-z0-9_-]+").expect("static regex is valid"));

static SECRET_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|secret)[=:]\s*\S+").expect("static regex is valid")
});

/// Strip credentials from text that is about to be logged
///
/// Telegram embeds the bot token in every request path, so transport errors
/// carrying the URL would otherwise leak it.
pub fn redact_secrets(message: &str) -> String {
    let redacted = BOT_TOKEN.replace_all(message, "bot***");
    SECRET_PAIR.replace_all(&redacted, "${1}=***").into_owned()
}
