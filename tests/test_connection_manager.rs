//! Connection manager lifecycle tests over scripted links

mod test_helpers;

use hub2::hub::{ConnectionManager, ConnectionState, CycleExit, ReconnectPolicy};
use hub2::reconcile::Reconciler;
use hub2::store::SubscriptionStore;
use hub2::testing::{MockConnector, MockLink, MockSink, ScriptedFrame};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_helpers::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Harness {
    manager: Arc<ConnectionManager<MockConnector>>,
    store: Arc<dyn SubscriptionStore>,
    sink: Arc<MockSink>,
    shutdown_tx: watch::Sender<bool>,
}

impl Harness {
    fn new(links: Vec<MockLink>, backoff: Duration) -> Self {
        let store = memory_store();
        let (dispatcher, sink) = dispatcher_for(store.clone());
        let manager = ConnectionManager::new(
            MockConnector::new(links),
            store.clone(),
            dispatcher,
            Reconciler::default(),
            ReconnectPolicy::new(backoff),
        );
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            manager: Arc::new(manager),
            store,
            sink,
            shutdown_tx,
        }
    }

    fn start(&self) -> JoinHandle<()> {
        let manager = self.manager.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move { manager.run(shutdown_rx).await })
    }

    async fn stop(&self, handle: JoinHandle<()>) {
        self.shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("manager should stop promptly")
            .unwrap();
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_connect_subscribe_dispatch_reconcile() {
    let link = MockLink::with_text_frames([text_frame("news", "PLAIN", "hello")]);
    let recorder = link.recorder();
    let harness = Harness::new(vec![link], Duration::from_secs(60));
    harness
        .store
        .set_topics(&direct_key("1", "alice"), &topics(&["news"]))
        .unwrap();

    let handle = harness.start();
    eventually("delivery", || harness.sink.calls().len() == 1).await;
    eventually("reconcile", || recorder.subscriptions().len() == 2).await;

    // Pre-connect subscribe, then the first reconcile pass re-sends
    assert_eq!(
        recorder.subscriptions(),
        vec![topics(&["news"]), topics(&["news"])]
    );
    assert_eq!(harness.store.upstream_snapshot().unwrap(), topics(&["news"]));

    harness.stop(handle).await;
    assert!(recorder.is_closed());
    assert!(harness.store.upstream_snapshot().unwrap().is_empty());
    assert_eq!(*harness.manager.state().borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unparseable_frames_are_dropped() {
    let link = MockLink::new(vec![
        ScriptedFrame::text("not json at all"),
        ScriptedFrame::text(r#"{"type":"PING"}"#),
        ScriptedFrame::Frame(hub2::transport::InboundFrame::Other("binary frame".into())),
        ScriptedFrame::text(text_frame("news", "PLAIN", "still here")),
    ]);
    let harness = Harness::new(vec![link], Duration::from_secs(60));
    harness
        .store
        .set_topics(&direct_key("1", "alice"), &topics(&["news"]))
        .unwrap();

    let handle = harness.start();
    eventually("delivery", || harness.sink.calls().len() == 1).await;
    harness.stop(handle).await;

    assert_eq!(harness.manager.connector().attempts(), 1);
}

#[tokio::test]
async fn test_drift_reconnects_without_backoff() {
    let first = MockLink::with_text_frames([text_frame("other", "PLAIN", "x")]);
    let first_recorder = first.recorder();
    let second = MockLink::default();
    let second_recorder = second.recorder();
    let harness = Harness::new(vec![first, second], Duration::from_secs(60));
    harness
        .store
        .set_topics(&direct_key("1", "alice"), &topics(&["keep"]))
        .unwrap();
    let stale: Vec<String> = (0..11).map(|i| format!("stale{i}")).collect();
    harness.store.set_upstream_snapshot(&stale).unwrap();

    let handle = harness.start();
    // A 60s backoff would blow the 2s deadline
    eventually("second connection", || !second_recorder.subscriptions().is_empty()).await;

    assert!(first_recorder.is_closed());
    assert_eq!(second_recorder.subscriptions()[0], topics(&["keep"]));
    harness.stop(handle).await;
}

#[tokio::test]
async fn test_connect_failure_backs_off_then_retries() {
    let link = MockLink::default();
    let recorder = link.recorder();
    let harness = Harness::new(vec![], Duration::from_millis(200));
    harness.manager.connector().push_failure("connection refused");
    harness.manager.connector().push_link(link);

    let started = Instant::now();
    let handle = harness.start();
    eventually("retry", || !recorder.subscriptions().is_empty()).await;

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(harness.manager.connector().attempts(), 2);
    harness.stop(handle).await;
}

#[tokio::test]
async fn test_hub_close_resets_snapshot_and_reconnects() {
    let first = MockLink::new(vec![
        ScriptedFrame::text(text_frame("news", "PLAIN", "hello")),
        ScriptedFrame::Close,
    ]);
    let second = MockLink::default();
    let second_recorder = second.recorder();
    let harness = Harness::new(vec![first, second], Duration::from_millis(20));
    harness
        .store
        .set_topics(&direct_key("1", "alice"), &topics(&["news"]))
        .unwrap();

    let handle = harness.start();
    eventually("reconnect", || !second_recorder.subscriptions().is_empty()).await;

    // The snapshot was reset on close, so nothing is believed subscribed yet
    assert!(harness.store.upstream_snapshot().unwrap().is_empty());
    harness.stop(handle).await;
}

#[tokio::test]
async fn test_shutdown_interrupts_backoff() {
    let harness = Harness::new(vec![], Duration::from_secs(60));
    let mut state = harness.manager.state();

    let handle = harness.start();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| matches!(s, ConnectionState::Erroring(_))),
    )
    .await
    .expect("connect failure should be reported")
    .unwrap();

    harness.stop(handle).await;
    assert_eq!(harness.manager.connector().attempts(), 1);
}

#[tokio::test]
async fn test_run_cycle_reports_receive_errors() {
    let harness = Harness::new(
        vec![MockLink::new(vec![ScriptedFrame::Fail("reset by peer".into())])],
        Duration::from_secs(60),
    );
    let (_tx, mut shutdown) = watch::channel(false);

    let result = harness.manager.run_cycle(&mut shutdown).await;

    assert!(matches!(result, Err(hub2::BridgeError::Transport(_))));
}

#[tokio::test]
async fn test_run_cycle_returns_on_shutdown() {
    let harness = Harness::new(vec![MockLink::default()], Duration::from_secs(60));
    let (tx, mut shutdown) = watch::channel(false);
    let manager = harness.manager.clone();

    let cycle = tokio::spawn(async move { manager.run_cycle(&mut shutdown).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send_replace(true);

    let exit = tokio::time::timeout(Duration::from_secs(2), cycle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(exit, CycleExit::Shutdown);
}
