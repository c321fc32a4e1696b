//! Hub connection lifecycle

pub mod manager;
pub mod state;

pub use manager::ConnectionManager;
pub use state::{ConnectionState, CycleExit, ReconnectPolicy, RetryDecision};
