//! Pure connection state and reconnect policy
//!
//! This module contains pure functions for deciding what the connection
//! manager does after each connection cycle ends.

use crate::error::{BridgeError, ErrorClass};
use std::time::Duration;
use tracing::{info, warn};

/// Connection manager state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; initial state and resting state between attempts
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Running the subscribe-all hook on a fresh link
    Subscribing,
    /// Pumping frames
    Receiving,
    /// Deliberate close (drift or shutdown)
    Closing,
    /// Failed cycle, waiting out the backoff
    Erroring(String),
}

/// How a connection cycle ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleExit {
    /// Shutdown was requested
    Shutdown,
    /// The hub closed the link
    HubClosed,
}

/// What to do once a cycle is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop the loop (shutdown only)
    Stop,
    /// Reconnect without waiting
    Immediate,
    /// Reconnect after the given delay
    After(Duration),
}

/// Reconnect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay after a transient failure
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Decide the next step from a cycle result (pure function)
    pub fn after_cycle(&self, result: &Result<CycleExit, BridgeError>) -> RetryDecision {
        match result {
            Ok(CycleExit::Shutdown) => RetryDecision::Stop,
            Ok(CycleExit::HubClosed) => RetryDecision::After(self.backoff),
            Err(e) => match e.class() {
                ErrorClass::Resync => RetryDecision::Immediate,
                ErrorClass::Transient => RetryDecision::After(self.backoff),
            },
        }
    }
}

/// Log a state transition
pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
    match (from, to) {
        (ConnectionState::Subscribing, ConnectionState::Receiving) => {
            info!("Hub connection established, receiving");
        }
        (_, ConnectionState::Erroring(reason)) => {
            warn!("Hub connection failed: {}", reason);
        }
        _ => {
            info!("Hub connection state: {:?} -> {:?}", from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PersistenceError;
    use crate::transport::TransportError;

    #[test]
    fn test_default_backoff_is_ten_seconds() {
        assert_eq!(ReconnectPolicy::default().backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_shutdown_stops() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.after_cycle(&Ok(CycleExit::Shutdown)), RetryDecision::Stop);
    }

    #[test]
    fn test_drift_reconnects_immediately() {
        let policy = ReconnectPolicy::default();
        let result = Err(BridgeError::drift_detected(11, 10));
        assert_eq!(policy.after_cycle(&result), RetryDecision::Immediate);
    }

    #[test]
    fn test_transient_failures_back_off() {
        let policy = ReconnectPolicy::new(Duration::from_millis(5));
        let expected = RetryDecision::After(Duration::from_millis(5));

        assert_eq!(policy.after_cycle(&Ok(CycleExit::HubClosed)), expected);
        assert_eq!(
            policy.after_cycle(&Err(TransportError::Timeout(Duration::from_secs(1)).into())),
            expected
        );
        assert_eq!(
            policy.after_cycle(&Err(PersistenceError::Poisoned.into())),
            expected
        );
    }
}
