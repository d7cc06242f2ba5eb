//! End-to-end tests for chainstack.
//!
//! Each test builds a transaction, signs it, and pushes it through a real
//! transport to an in-process node that decodes it with the same codec.
//!
//! ```bash
//! cargo test -p chainstack-integration-tests
//! ```

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use axum::routing::post;
    use axum::{Json, Router};
    use chainstack::{
        broadcast, ChainId, Client, ClientConfig, LocalSigner, Nat, Pricing, Signer,
        SubscriptionEvent, Transaction, TransactionData,
    };
    use chainstack_core::{AddressKind, ByteString, FeePolicy};
    use chainstack_tx::codec;
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    const PK: &str = "0x289c2857d4598e37fb9647507e47a309d6133539bf21a8b9cb6df88fd5232031";
    const CHAIN: ChainId = ChainId::new(3);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn transfer(nonce: u64) -> TransactionData {
        TransactionData {
            nonce: Nat::from(nonce),
            to: "0x0000970e8128ab834e8eac17ab8e3812f010678cf791".parse().unwrap(),
            hash_lock: None,
            time_lock: Nat::zero(),
            value: Nat::from(10_000u64),
            pricing: Pricing::gas(Nat::from(1u64), Nat::from(42_000u64)),
            extra_data: ByteString::from_text("integration"),
            from: None,
        }
    }

    /// What a node does with `chainstack_newTransaction`: decode, recover
    /// the sender and report the transaction id.
    fn accept_raw(raw: &str) -> Value {
        let tx = match Transaction::from_raw_hex(raw) {
            Ok(tx) => tx,
            Err(e) => return json!({"error": {"code": -32000, "message": e.to_string()}}),
        };
        let from = tx.recover().unwrap();
        let hash = tx.tx_hash().unwrap();
        json!({"result": {"hash": hash.to_hex(), "from": from.to_checksum()}})
    }

    fn respond(request: &Value, body: Value) -> Value {
        let mut response = json!({"jsonrpc": "2.0", "id": request["id"].clone()});
        if let (Some(out), Value::Object(fields)) = (response.as_object_mut(), body) {
            out.extend(fields);
        }
        response
    }

    async fn http_node() -> SocketAddr {
        fn answer(request: &Value) -> Value {
            let body = match request["method"].as_str() {
                Some("chainstack_newTransaction") => {
                    accept_raw(request["params"][0].as_str().unwrap_or_default())
                }
                Some("chainstack_currentBlock") => json!({"result": "0x1"}),
                _ => json!({"error": {"code": -32601, "message": "method not found"}}),
            };
            respond(request, body)
        }

        async fn rpc(Json(request): Json<Value>) -> Json<Value> {
            match &request {
                Value::Array(items) => Json(items.iter().map(answer).collect()),
                single => Json(answer(single)),
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", post(rpc));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// WebSocket node that announces every accepted transaction to its
    /// `pendingTransactions` subscribers on the same socket.
    async fn ws_node() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let next_id = Arc::new(AtomicU64::new(0));
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let next_id = Arc::clone(&next_id);
                tokio::spawn(async move {
                    let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
                    let mut subscriptions: Vec<String> = Vec::new();
                    while let Some(Ok(Message::Text(text))) = socket.next().await {
                        let request: Value = serde_json::from_str(&text).unwrap();
                        let params = &request["params"];
                        let body = match request["method"].as_str().unwrap_or_default() {
                            "chainstack_subscribe" => {
                                let id = format!("0x{:x}", next_id.fetch_add(1, Ordering::SeqCst) + 1);
                                subscriptions.push(id.clone());
                                json!({"result": id})
                            }
                            "chainstack_unsubscribe" => {
                                let id = params[0].as_str().unwrap_or_default();
                                let known = subscriptions.iter().any(|s| s == id);
                                subscriptions.retain(|s| s != id);
                                json!({"result": known})
                            }
                            "chainstack_newTransaction" => {
                                let body = accept_raw(params[0].as_str().unwrap_or_default());
                                let mut out = respond(&request, body.clone()).to_string();
                                // announcements share the write with the reply
                                for id in &subscriptions {
                                    let note = json!({
                                        "jsonrpc": "2.0",
                                        "method": "chainstack_subscription",
                                        "params": {"subscription": id, "result": body["result"]["hash"]}
                                    });
                                    out.push_str(&note.to_string());
                                }
                                socket.send(Message::Text(out)).await.unwrap();
                                continue;
                            }
                            _ => json!({"error": {"code": -32601, "message": "method not found"}}),
                        };
                        let reply = respond(&request, body).to_string();
                        socket.send(Message::Text(reply)).await.unwrap();
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_sign_and_broadcast_over_http() {
        init_tracing();
        let addr = http_node().await;
        let client = Client::connect(format!("http://{addr}/")).unwrap();
        assert!(client.is_connected().await);

        let signer = LocalSigner::from_hex(PK).unwrap();
        let mut tx = Transaction::new(transfer(0));
        tx.sign(&signer, CHAIN).unwrap();
        assert_eq!(tx.data().from, Some(signer.address()));
        assert_eq!(tx.chain_id().unwrap(), CHAIN);

        let result = broadcast(&client, &tx).await.unwrap();
        assert_eq!(result["hash"], tx.tx_hash().unwrap().to_hex());
        assert_eq!(result["from"], signer.address().to_checksum());
    }

    #[tokio::test]
    async fn test_node_rejects_garbage() {
        let addr = http_node().await;
        let client = Client::connect(format!("http://{addr}/")).unwrap();
        let err = client
            .send_raw_transaction(&ByteString::from_hex("0xdeadbeef").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, chainstack::RpcError::ResponseError { code: -32000, .. }));
    }

    #[tokio::test]
    async fn test_subscription_sees_broadcast_transactions() {
        init_tracing();
        let addr = ws_node().await;
        let client = Client::connect(format!("ws://{addr}")).unwrap();
        let (mut pending, mut events) = client.subscription("pendingTransactions", 0);
        pending.subscribe(vec![]).await.unwrap();

        let signer = LocalSigner::from_hex(PK).unwrap();
        let mut hashes = Vec::new();
        for nonce in 0..3 {
            let mut tx = Transaction::new(transfer(nonce));
            tx.sign(&signer, CHAIN).unwrap();
            let result = broadcast(&client, &tx).await.unwrap();
            hashes.push(result["hash"].clone());
        }

        for expected in &hashes {
            assert_eq!(
                events.recv().await.unwrap(),
                SubscriptionEvent::Data(expected.clone())
            );
        }
        assert!(pending.unsubscribe().await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_broadcast() {
        let addr = http_node().await;
        let client = Client::connect(format!("http://{addr}/")).unwrap();
        let signer = LocalSigner::from_hex(PK).unwrap();
        let mut tx = Transaction::new(transfer(9));
        tx.sign(&signer, CHAIN).unwrap();

        let mut batch = client.batch();
        batch
            .add("chainstack_currentBlock", vec![])
            .add("chainstack_newTransaction", vec![json!(tx.serialize().to_hex())])
            .add("chainstack_getNothing", vec![]);
        let results = batch.execute().await.unwrap();

        assert_eq!(results[0], Ok(json!("0x1")));
        let accepted = results[1].as_ref().unwrap();
        assert_eq!(accepted["hash"], tx.tx_hash().unwrap().to_hex());
        assert!(matches!(
            results[2],
            Err(chainstack::RpcError::ResponseError { code: -32601, .. })
        ));
    }

    #[test]
    fn test_signed_envelope_json_and_fee() {
        let signer = LocalSigner::from_hex(PK).unwrap();
        let mut tx = Transaction::new(transfer(1));
        let unsigned_fee = tx.estimate_fee(&FeePolicy::default());
        tx.sign(&signer, CHAIN).unwrap();
        let signed_fee = tx.estimate_fee(&FeePolicy::default());

        let len = codec::rlp_signed(tx.data(), tx.witness()).len() as u64;
        assert_eq!(signed_fee, Nat::from(len * 100));
        assert!(!unsigned_fee.is_zero());
        assert_ne!(unsigned_fee, signed_fee);

        let envelope = tx.signed_transaction().unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["raw"], tx.serialize().to_hex());
        assert_eq!(json["tx"]["extraData"], "0x696e746567726174696f6e");

        let decoded = Transaction::from_raw(envelope.raw.as_slice()).unwrap();
        assert_eq!(decoded.recover().unwrap(), signer.address());
        assert_eq!(signer.address().kind(), Some(AddressKind::Normal));
    }
}
