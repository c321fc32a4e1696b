//! Connection manager: the single top-level driver
//!
//! Owns the hub link for its lifetime and runs the cycle
//! `Connecting -> Subscribing -> Receiving -> Closing/Erroring -> Disconnected`
//! until shutdown is requested. Frames are handled strictly one at a time:
//! dispatch and reconciliation for a frame finish before the next read.

use super::state::{log_state_transition, ConnectionState, CycleExit, ReconnectPolicy, RetryDecision};
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{self, Frame};
use crate::reconcile::Reconciler;
use crate::store::SubscriptionStore;
use crate::transport::{HubConnector, HubLink, InboundFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

pub struct ConnectionManager<C> {
    connector: C,
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
}

impl<C: HubConnector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Dispatcher,
        reconciler: Reconciler,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            store,
            dispatcher,
            reconciler,
            policy,
            state_tx,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Watch connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.borrow().clone();
        if previous != next {
            log_state_transition(&previous, &next);
        }
        self.state_tx.send_replace(next);
    }

    /// Run connection cycles until `shutdown` flips to true
    ///
    /// Every failure is logged and followed by a reconnect; nothing but the
    /// shutdown signal ends this loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let attempt = Uuid::new_v4();
            let span = crate::hub_span!(attempt = %attempt);
            let result = self.run_cycle(&mut shutdown).instrument(span).await;

            // The hub forgets our subscriptions whenever the link goes away
            self.reset_snapshot();

            match &result {
                Ok(CycleExit::Shutdown) => info!("Hub connection closed for shutdown"),
                Ok(CycleExit::HubClosed) => warn!("Hub closed the connection"),
                Err(e @ BridgeError::DriftDetected { .. }) => info!("Resyncing: {}", e),
                Err(e) => error!("Hub connection cycle failed: {}", e),
            }

            match self.policy.after_cycle(&result) {
                RetryDecision::Stop => {
                    self.set_state(ConnectionState::Disconnected);
                    break;
                }
                RetryDecision::Immediate => {
                    self.set_state(ConnectionState::Disconnected);
                }
                RetryDecision::After(delay) => {
                    let reason = match &result {
                        Err(e) => e.to_string(),
                        Ok(_) => "hub closed the connection".to_string(),
                    };
                    self.set_state(ConnectionState::Erroring(reason));
                    info!("Reconnecting in {:?}", delay);
                    if !interruptible_sleep(shutdown.clone(), delay).await {
                        self.set_state(ConnectionState::Disconnected);
                        break;
                    }
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
        info!("Connection manager stopped");
    }

    /// One full connection attempt, from connect to close
    pub async fn run_cycle(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> BridgeResult<CycleExit> {
        self.set_state(ConnectionState::Connecting);
        let mut link = tokio::select! {
            link = self.connector.connect() => link?,
            _ = wait_for_shutdown(shutdown) => return Ok(CycleExit::Shutdown),
        };

        self.set_state(ConnectionState::Subscribing);
        if let Err(e) = self.on_connected(&mut link).await {
            link.close().await;
            return Err(e);
        }

        self.set_state(ConnectionState::Receiving);
        let result = self.receive_loop(&mut link, shutdown).await;
        if matches!(
            result,
            Ok(CycleExit::Shutdown) | Err(BridgeError::DriftDetected { .. })
        ) {
            self.set_state(ConnectionState::Closing);
        }
        link.close().await;
        result
    }

    /// Pre-receive hook: subscribe to everything currently wanted
    ///
    /// The snapshot is left alone; the first reconciliation pass records it.
    async fn on_connected(&self, link: &mut C::Link) -> BridgeResult<()> {
        let desired = self.store.all_topics()?;
        info!(topics = desired.len(), "Subscribing to desired topics");
        link.subscribe(&desired).await?;
        Ok(())
    }

    async fn receive_loop(
        &self,
        link: &mut C::Link,
        shutdown: &mut watch::Receiver<bool>,
    ) -> BridgeResult<CycleExit> {
        loop {
            let frame = tokio::select! {
                _ = wait_for_shutdown(shutdown) => return Ok(CycleExit::Shutdown),
                frame = link.next_frame() => frame?,
            };

            match frame {
                Some(frame) => self.handle_frame(link, frame).await?,
                None => return Ok(CycleExit::HubClosed),
            }
        }
    }

    /// Post-frame hook: dispatch publishes, then always reconcile
    async fn handle_frame(&self, link: &mut C::Link, frame: InboundFrame) -> BridgeResult<()> {
        match frame {
            InboundFrame::Text(text) => match protocol::parse(&text) {
                Ok(Frame::Message(message)) => {
                    self.dispatcher.dispatch(&message).await?;
                }
                Ok(Frame::Envelope(envelope)) => {
                    debug!(action = ?envelope.action, topics = ?envelope.topics, "Hub echoed envelope");
                }
                Err(e) => warn!(error = %e, "Dropping unparseable frame"),
            },
            InboundFrame::Other(description) => {
                info!("Unknown frame from hub: {}", description);
            }
        }

        self.reconciler.reconcile(self.store.as_ref(), link).await?;
        Ok(())
    }

    fn reset_snapshot(&self) {
        if let Err(e) = self.store.set_upstream_snapshot(&[]) {
            error!("Failed to reset upstream snapshot: {}", e);
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay` unless shutdown is requested first
///
/// Returns true if the sleep completed, false if shutdown was requested.
async fn interruptible_sleep(mut shutdown: watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = wait_for_shutdown(&mut shutdown) => {
            info!("Shutdown requested during reconnect delay");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_tx, rx) = watch::channel(false);
        assert!(interruptible_sleep(rx, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let sleeper = tokio::spawn(interruptible_sleep(rx, Duration::from_secs(60)));
        tx.send(true).unwrap();
        assert!(!sleeper.await.unwrap());
    }
}
