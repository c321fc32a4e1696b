//! Subscription reconciliation
//!
//! Keeps the hub's subscriptions for this connection in line with the union
//! of every recipient's interest. The hub offers no unsubscribe, so topics
//! nobody wants any more are tolerated until there are more than
//! `drift_threshold` of them; then the connection is dropped and rebuilt
//! from scratch.

use crate::error::{BridgeError, BridgeResult};
use crate::store::SubscriptionStore;
use crate::transport::HubLink;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Stale topics tolerated before forcing a resync
pub const DEFAULT_DRIFT_THRESHOLD: usize = 10;

/// Outcome of comparing desired and upstream topic sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// Upstream already covers everything wanted
    InSync,
    /// Subscribe to `missing`, then record `desired` as the new snapshot
    Subscribe {
        missing: Vec<String>,
        desired: Vec<String>,
    },
    /// Too many unwanted subscriptions; drop the connection
    Resync { stale: Vec<String> },
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    drift_threshold: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD)
    }
}

impl Reconciler {
    pub fn new(drift_threshold: usize) -> Self {
        Self { drift_threshold }
    }

    pub fn drift_threshold(&self) -> usize {
        self.drift_threshold
    }

    /// Decide what to do for the given sets (pure function)
    pub fn plan(&self, desired: &[String], upstream: &[String]) -> ReconcileDecision {
        let desired: BTreeSet<&String> = desired.iter().collect();
        let upstream: BTreeSet<&String> = upstream.iter().collect();

        let stale: Vec<String> = upstream
            .difference(&desired)
            .map(|t| t.to_string())
            .collect();
        if stale.len() > self.drift_threshold {
            return ReconcileDecision::Resync { stale };
        }

        let missing: Vec<String> = desired
            .difference(&upstream)
            .map(|t| t.to_string())
            .collect();
        if missing.is_empty() {
            ReconcileDecision::InSync
        } else {
            ReconcileDecision::Subscribe {
                missing,
                desired: desired.into_iter().cloned().collect(),
            }
        }
    }

    /// Run one reconciliation pass against the store and the live link
    ///
    /// On drift the snapshot is reset and [`BridgeError::DriftDetected`] is
    /// returned; the caller owns closing the link.
    pub async fn reconcile<L>(
        &self,
        store: &dyn SubscriptionStore,
        link: &mut L,
    ) -> BridgeResult<ReconcileDecision>
    where
        L: HubLink + ?Sized,
    {
        let desired = store.all_topics()?;
        let upstream = store.upstream_snapshot()?;

        let decision = self.plan(&desired, &upstream);
        match &decision {
            ReconcileDecision::InSync => {
                debug!(topics = desired.len(), "Subscriptions in sync");
            }
            ReconcileDecision::Subscribe { missing, desired } => {
                info!(?missing, "Subscribing to new topics");
                link.subscribe(missing).await?;
                store.set_upstream_snapshot(desired)?;
            }
            ReconcileDecision::Resync { stale } => {
                warn!(
                    stale = stale.len(),
                    threshold = self.drift_threshold,
                    "Too many stale subscriptions, resetting hub connection"
                );
                store.set_upstream_snapshot(&[])?;
                return Err(BridgeError::drift_detected(stale.len(), self.drift_threshold));
            }
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn numbered(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_plan_in_sync() {
        let reconciler = Reconciler::default();
        let set = topics(&["a", "b"]);
        assert_eq!(reconciler.plan(&set, &set), ReconcileDecision::InSync);
    }

    #[test]
    fn test_plan_missing_topics() {
        let reconciler = Reconciler::default();
        assert_eq!(
            reconciler.plan(&topics(&["sports", "news"]), &[]),
            ReconcileDecision::Subscribe {
                missing: topics(&["news", "sports"]),
                desired: topics(&["news", "sports"]),
            }
        );
    }

    #[test]
    fn test_plan_tolerates_stale_up_to_threshold() {
        let reconciler = Reconciler::default();
        let upstream = numbered("old", 10);
        assert_eq!(reconciler.plan(&[], &upstream), ReconcileDecision::InSync);

        let mut with_new = upstream.clone();
        with_new.push("kept".into());
        assert_eq!(
            reconciler.plan(&topics(&["kept", "new"]), &with_new),
            ReconcileDecision::Subscribe {
                missing: topics(&["new"]),
                desired: topics(&["kept", "new"]),
            }
        );
    }

    #[test]
    fn test_plan_resyncs_past_threshold() {
        let reconciler = Reconciler::default();
        let upstream = numbered("old", 11);
        match reconciler.plan(&topics(&["a"]), &upstream) {
            ReconcileDecision::Resync { stale } => assert_eq!(stale.len(), 11),
            other => panic!("Expected resync, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_threshold() {
        let reconciler = Reconciler::new(0);
        assert!(matches!(
            reconciler.plan(&[], &topics(&["gone"])),
            ReconcileDecision::Resync { .. }
        ));
    }
}
