//! Hub wire protocol
//!
//! Message types exchanged with the hub and the codec that parses inbound
//! frames and classifies their payloads.

pub mod codec;
pub mod messages;

pub use codec::{
    classify, parse, serialize, ClassifyError, Frame, MediaKind, MediaPart, MediaSource, ParseError,
    Payload, TextKind,
};
pub use messages::*;
