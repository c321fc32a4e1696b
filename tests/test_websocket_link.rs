//! Websocket link against a local tokio-tungstenite server

use futures_util::{SinkExt, StreamExt};
use hub2::protocol::{Action, Envelope};
use hub2::transport::{HubConnector, HubLink, InboundFrame, TransportError, WsConnector};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

#[tokio::test]
async fn test_subscribe_receive_and_close() {
    let (listener, url) = listener().await;
    let (sub_tx, sub_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = sub_tx.send(text);
        }
        ws.send(Message::Text(
            r#"{"type":"MESSAGE","topic":"news","message":{"type":"PLAIN","data":"hi"}}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let connector =
        WsConnector::new(&url, Duration::from_secs(2), Duration::from_secs(20)).unwrap();
    let mut link = connector.connect().await.unwrap();
    link.subscribe(&["news".to_string()]).await.unwrap();

    let sub: Envelope = serde_json::from_str(&sub_rx.await.unwrap()).unwrap();
    assert_eq!(sub.action, Action::Subscribe);
    assert_eq!(sub.topics, vec!["news"]);

    match link.next_frame().await.unwrap() {
        Some(InboundFrame::Text(text)) => assert!(text.contains("\"topic\":\"news\"")),
        other => panic!("unexpected frame {other:?}"),
    }
    assert!(matches!(
        link.next_frame().await.unwrap(),
        Some(InboundFrame::Other(_))
    ));
    assert_eq!(link.next_frame().await.unwrap(), None);
    link.close().await;
}

#[tokio::test]
async fn test_silent_hub_times_out() {
    let (listener, url) = listener().await;

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        // Never read, so pings go unanswered
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let heartbeat = Duration::from_millis(50);
    let connector = WsConnector::new(&url, Duration::from_secs(2), heartbeat).unwrap();
    let mut link = connector.connect().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), link.next_frame())
        .await
        .expect("idle link should fail well within the test deadline");

    assert!(matches!(result, Err(TransportError::Timeout(limit)) if limit == heartbeat * 2));
}

#[tokio::test]
async fn test_slow_reader_is_not_timed_out() {
    let (listener, url) = listener().await;

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let publish = tokio::time::sleep(Duration::from_millis(600));
        tokio::pin!(publish);
        let mut published = false;
        // Keep reading so pings are answered
        loop {
            tokio::select! {
                message = ws.next() => {
                    if !matches!(message, Some(Ok(_))) {
                        break;
                    }
                }
                _ = &mut publish, if !published => {
                    published = true;
                    ws.send(Message::Text("late".into())).await.unwrap();
                }
            }
        }
    });

    let heartbeat = Duration::from_millis(100);
    let connector = WsConnector::new(&url, Duration::from_secs(2), heartbeat).unwrap();
    let mut link = connector.connect().await.unwrap();

    // Busy elsewhere for longer than the idle limit before reading
    tokio::time::sleep(heartbeat * 3).await;

    let frame = tokio::time::timeout(Duration::from_secs(2), link.next_frame())
        .await
        .expect("frame should arrive within the test deadline");
    assert_eq!(frame.unwrap(), Some(InboundFrame::Text("late".to_string())));
    link.close().await;
}

#[tokio::test]
async fn test_connect_refused() {
    let (listener, url) = listener().await;
    drop(listener);

    let connector =
        WsConnector::new(&url, Duration::from_secs(2), Duration::from_secs(20)).unwrap();
    assert!(matches!(
        connector.connect().await,
        Err(TransportError::ConnectFailed(_))
    ));
}

#[test]
fn test_rejects_http_scheme() {
    assert!(matches!(
        WsConnector::new("https://hub.example", Duration::from_secs(1), Duration::from_secs(1)),
        Err(TransportError::InvalidUrl(_))
    ));
}
