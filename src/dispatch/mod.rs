//! Message dispatch
//!
//! Resolves which recipients want a published message, renders it for each
//! of them and hands it to a [`Sink`]. A failed delivery to one recipient
//! never stops delivery to the others.

pub mod dispatcher;
pub mod render;
pub mod sink;
pub mod telegram;

pub use dispatcher::{DeliveryReport, DispatchOutcome, Dispatcher, SkipReason};
pub use sink::{DeliveryError, MediaRef, OutgoingMedia, SendOptions, Sink, TextFormat};
pub use telegram::{TelegramConfig, TelegramSink};
