//! hub2: bridge between a topic-based pub/sub hub and chat recipients
//!
//! Recipients register interest in topics; the bridge keeps one websocket
//! connection to the hub subscribed to the union of those topics, and fans
//! every published message out to the recipients that asked for it.
//!
//! # Components
//!
//! - [`store`]: durable recipient → topics mapping plus the upstream snapshot
//! - [`protocol`]: hub envelopes, frame parsing and payload classification
//! - [`reconcile`]: keeps the hub's subscriptions in line with the store
//! - [`dispatch`]: renders and delivers messages through a [`dispatch::Sink`]
//! - [`hub`]: the connection manager driving all of the above
//!
//! # Quick Start
//!
//! ```rust
//! use hub2::protocol::{Envelope, MessageBody, PayloadKind};
//!
//! let envelope = Envelope::publish(
//!     vec!["news".to_string()],
//!     MessageBody::new(PayloadKind::Markdown, "*hello*"),
//! );
//! let frame = hub2::protocol::serialize(&envelope).unwrap();
//! assert!(frame.contains("\"action\":\"PUB\""));
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod observability;
pub mod protocol;
pub mod reconcile;
pub mod store;
pub mod testing;
pub mod transport;

pub use config::{BridgeConfig, ConfigError};
pub use dispatch::{Dispatcher, Sink, TelegramSink};
pub use error::{BridgeError, BridgeResult, ErrorClass};
pub use hub::{ConnectionManager, ConnectionState, ReconnectPolicy};
pub use reconcile::{ReconcileDecision, Reconciler};
pub use store::{RecipientKey, SubscriptionStore, TopicStore};
