//! Client tests over a Unix socket against a scripted node.
#![cfg(unix)]

mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chainstack_core::{ByteString, ClientConfig};
use chainstack_rpc::{Client, ConnectionState, RpcError, SubscriptionEvent, SubscriptionState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use common::{eventually, init_tracing, Action, MockNode};

/// Serves `node` on a socket inside `dir`; each line read is one frame.
fn serve(dir: &TempDir, node: Arc<MockNode>) -> PathBuf {
    let path = dir.path().join("node.ipc");
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            node.connections.fetch_add(1, Ordering::SeqCst);
            let node = Arc::clone(&node);
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match node.handle(&line) {
                        Action::Write(text) => {
                            if writer.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        Action::Drop => break,
                        Action::Silent => {}
                    }
                }
            });
        }
    });
    path
}

fn config(path: &Path) -> ClientConfig {
    ClientConfig {
        reconnect_interval_ms: 50,
        ..ClientConfig::default().with_provider(path.display().to_string())
    }
}

async fn connected_client(config: ClientConfig) -> Client {
    let client = Client::new(config).unwrap();
    let mut state = client.transport().watch_state().unwrap();
    state
        .wait_for(|s| *s == ConnectionState::Open)
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_ipc_send_and_probe() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let node = Arc::new(MockNode::default());
    let path = serve(&dir, Arc::clone(&node));
    let client = Client::new(config(&path)).unwrap();

    // sent while still connecting
    let echoed = client.send("echo", vec![json!("a"), json!(2)]).await.unwrap();
    assert_eq!(echoed, json!(["a", 2]));
    assert!(client.is_connected().await);

    let block: String = client.call("chainstack_currentBlock", vec![]).await.unwrap();
    assert_eq!(block, "0x10");
}

#[tokio::test]
async fn test_ipc_response_error() {
    let dir = TempDir::new().unwrap();
    let path = serve(&dir, Arc::new(MockNode::default()));
    let client = connected_client(config(&path)).await;

    let err = client.send("fail", vec![]).await.unwrap_err();
    assert_eq!(
        err,
        RpcError::ResponseError {
            code: -32000,
            message: "boom".to_string(),
            data: None,
        }
    );
    assert_eq!(client.send("", vec![]).await, Err(RpcError::MissingMethod));
}

#[tokio::test]
async fn test_send_raw_transaction_uses_hex() {
    let dir = TempDir::new().unwrap();
    let path = serve(&dir, Arc::new(MockNode::default()));
    let client = connected_client(config(&path)).await;

    let raw = ByteString::from_hex("0xc480808080").unwrap();
    let err = client.send_raw_transaction(&raw).await.unwrap_err();
    // the scripted node does not know the method, but the frame reached it
    assert!(matches!(err, RpcError::ResponseError { code: -32601, ref message, .. }
        if message.contains("chainstack_newTransaction")));
}

#[tokio::test]
async fn test_ipc_batch() {
    let dir = TempDir::new().unwrap();
    let path = serve(&dir, Arc::new(MockNode::default()));
    let client = connected_client(config(&path)).await;

    let mut batch = client.batch();
    batch
        .add("chainstack_currentBlock", vec![])
        .add("fail", vec![])
        .add("echo", vec![json!(1)]);
    let results = batch.execute().await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(json!("0x10")));
    assert!(matches!(results[1], Err(RpcError::ResponseError { .. })));
    assert_eq!(results[2], Ok(json!([1])));
}

#[tokio::test]
async fn test_timeout_does_not_disturb_other_requests() {
    let dir = TempDir::new().unwrap();
    let path = serve(&dir, Arc::new(MockNode::default()));
    let client = connected_client(
        config(&path).with_request_timeout(Duration::from_millis(100)),
    )
    .await;

    let (slow, fast) = tokio::join!(client.send("silent", vec![]), client.send("echo", vec![json!("x")]));
    assert_eq!(slow, Err(RpcError::ConnectionTimeout(100)));
    assert_eq!(fast, Ok(json!(["x"])));
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_subscription_receives_notifications() {
    let dir = TempDir::new().unwrap();
    let path = serve(&dir, Arc::new(MockNode::default()));
    let client = connected_client(config(&path)).await;

    let (mut subscription, mut events) = client.subscription("newBlocks", 1);
    assert_eq!(subscription.state(), SubscriptionState::Pending);
    let id = subscription.subscribe(vec![json!(true)]).await.unwrap();
    assert_eq!(subscription.id(), Some(id.clone()));
    assert_eq!(subscription.state(), SubscriptionState::Active);

    client.send("emit", vec![json!(id), json!({"number": "0x11"})]).await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        SubscriptionEvent::Data(json!({"number": "0x11"}))
    );

    client.send("emit", vec![json!(id), json!(["a", "b"])]).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SubscriptionEvent::Data(json!("a")));
    assert_eq!(events.recv().await.unwrap(), SubscriptionEvent::Data(json!("b")));

    // other ids are not delivered here
    client.send("emit", vec![json!("0xff"), json!(1)]).await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_subscribe_validates_param_count() {
    let dir = TempDir::new().unwrap();
    let path = serve(&dir, Arc::new(MockNode::default()));
    let client = connected_client(config(&path)).await;

    let (mut subscription, _events) = client.subscription("logs", 1);
    assert_eq!(
        subscription.subscribe(vec![]).await,
        Err(RpcError::InvalidNumberOfParams {
            method: "logs".to_string(),
            got: 0,
            expected: 1,
        })
    );
}

#[tokio::test]
async fn test_resubscribe_unsubscribes_prior_id_once() {
    let dir = TempDir::new().unwrap();
    let node = Arc::new(MockNode::default());
    let path = serve(&dir, Arc::clone(&node));
    let client = connected_client(config(&path)).await;

    let (mut subscription, _events) = client.subscription("newBlocks", 0);
    let first = subscription.subscribe(vec![]).await.unwrap();
    let second = subscription.subscribe(vec![]).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(node.unsubscribed(), vec![first]);
    assert_eq!(node.subscribes.load(Ordering::SeqCst), 2);

    assert!(subscription.unsubscribe().await.unwrap());
    assert_eq!(subscription.state(), SubscriptionState::Unsubscribed);
    assert_eq!(node.unsubscribed().len(), 2);
    assert!(!subscription.unsubscribe().await.unwrap());
    assert_eq!(node.unsubscribed().len(), 2);
}

#[tokio::test]
async fn test_reconnect_resubscribes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let node = Arc::new(MockNode::default());
    let path = serve(&dir, Arc::clone(&node));
    let client = connected_client(config(&path)).await;

    let (mut subscription, mut events) = client.subscription("newBlocks", 0);
    let first = subscription.subscribe(vec![]).await.unwrap();

    let err = client.send("drop", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidConnection(_)));
    assert!(matches!(
        events.recv().await.unwrap(),
        SubscriptionEvent::Error(RpcError::InvalidConnection(_))
    ));

    eventually(|| {
        subscription.state() == SubscriptionState::Active && subscription.id() != Some(first.clone())
    })
    .await;
    assert_eq!(node.connections.load(Ordering::SeqCst), 2);
    assert_eq!(node.subscribes.load(Ordering::SeqCst), 2);

    let second = subscription.id().unwrap();
    client.send("emit", vec![json!(second), json!(7)]).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SubscriptionEvent::Data(json!(7)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manual_reconnect_resubscribes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let node = Arc::new(MockNode::default());
    let path = serve(&dir, Arc::clone(&node));
    let client = connected_client(config(&path)).await;

    let (mut subscription, mut events) = client.subscription("newBlocks", 0);
    let first = subscription.subscribe(vec![]).await.unwrap();

    // reconnect from Open: the actor goes straight back to Connecting
    client.transport().reconnect().unwrap();
    eventually(|| {
        subscription.state() == SubscriptionState::Active && subscription.id() != Some(first.clone())
    })
    .await;
    assert_eq!(node.connections.load(Ordering::SeqCst), 2);
    assert_eq!(node.subscribes.load(Ordering::SeqCst), 2);
    assert!(matches!(
        events.recv().await.unwrap(),
        SubscriptionEvent::Error(RpcError::InvalidConnection(_))
    ));

    let second = subscription.id().unwrap();
    client.send("emit", vec![json!(second), json!(8)]).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SubscriptionEvent::Data(json!(8)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_immediate_reconnect_after_drop_resubscribes() {
    let dir = TempDir::new().unwrap();
    let node = Arc::new(MockNode::default());
    let path = serve(&dir, Arc::clone(&node));
    let client = connected_client(ClientConfig {
        reconnect_interval_ms: 0,
        ..config(&path)
    })
    .await;

    let (mut subscription, _events) = client.subscription("newBlocks", 0);
    let first = subscription.subscribe(vec![]).await.unwrap();

    assert!(client.send("drop", vec![]).await.is_err());
    eventually(|| {
        subscription.state() == SubscriptionState::Active && subscription.id() != Some(first.clone())
    })
    .await;
    assert_eq!(node.subscribes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_clear_subscriptions_keeps_syncing() {
    let dir = TempDir::new().unwrap();
    let node = Arc::new(MockNode::default());
    let path = serve(&dir, Arc::clone(&node));
    let client = connected_client(config(&path)).await;

    let (mut syncing, mut syncing_events) = client.subscription("syncing", 0);
    let (mut blocks, mut block_events) = client.subscription("newBlocks", 0);
    let syncing_id = syncing.subscribe(vec![]).await.unwrap();
    let blocks_id = blocks.subscribe(vec![]).await.unwrap();

    client.clear_subscriptions(true).await.unwrap();
    assert_eq!(node.unsubscribed(), vec![blocks_id]);
    assert_eq!(blocks.state(), SubscriptionState::Unsubscribed);
    assert!(block_events.recv().await.is_none());

    // the spared subscription still receives notifications
    assert_eq!(syncing.state(), SubscriptionState::Active);
    client
        .send("emit", vec![Value::String(syncing_id), json!(false)])
        .await
        .unwrap();
    assert_eq!(
        syncing_events.recv().await.unwrap(),
        SubscriptionEvent::Data(json!(false))
    );
}

#[tokio::test]
async fn test_unreachable_socket_without_reconnect() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nobody.ipc");
    let client = Client::new(ClientConfig {
        reconnect: false,
        ..config(&path)
    })
    .unwrap();
    assert!(matches!(
        client.send("echo", vec![]).await,
        Err(RpcError::InvalidConnection(_))
    ));
    assert!(!client.is_connected().await);
}
