//! In-process mock node shared by the streaming transport tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

/// What the transport glue should do after a frame.
pub enum Action {
    /// Write this text as-is (may hold several concatenated frames).
    Write(String),
    /// Close the connection without answering.
    Drop,
    /// Do nothing.
    Silent,
}

/// Scripted node.
///
/// | method | reply |
/// |---|---|
/// | `chainstack_currentBlock` | `"0x10"` |
/// | `echo` | the params |
/// | `fail` | error `-32000 boom` |
/// | `chainstack_subscribe` | fresh id `0x1`, `0x2`, ... |
/// | `chainstack_unsubscribe` | `true`, id recorded |
/// | `emit [id, result]` | notification, then `true`, in one write |
/// | `silent` | nothing |
/// | `drop` | connection closed |
#[derive(Default)]
pub struct MockNode {
    pub subscribes: AtomicUsize,
    pub connections: AtomicUsize,
    pub unsubscribed: Mutex<Vec<String>>,
    next_subscription: AtomicU64,
}

impl MockNode {
    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }

    pub fn handle(&self, text: &str) -> Action {
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            return Action::Silent;
        };
        match frame {
            Value::Array(requests) => {
                let replies: Vec<Value> = requests
                    .iter()
                    .filter_map(|request| self.answer(request).map(|(_, reply)| reply))
                    .collect();
                Action::Write(Value::Array(replies).to_string())
            }
            request => {
                if request["method"] == "drop" {
                    return Action::Drop;
                }
                match self.answer(&request) {
                    Some((prefix, reply)) => Action::Write(format!("{prefix}{reply}")),
                    None => Action::Silent,
                }
            }
        }
    }

    fn answer(&self, request: &Value) -> Option<(String, Value)> {
        let id = request["id"].clone();
        let params = request["params"].clone();
        let ok = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});
        let reply = match request["method"].as_str().unwrap_or_default() {
            "chainstack_currentBlock" => ok(json!("0x10")),
            "echo" => ok(params),
            "fail" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32000, "message": "boom"}
            }),
            "chainstack_subscribe" => {
                self.subscribes.fetch_add(1, Ordering::SeqCst);
                let n = self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1;
                ok(json!(format!("0x{n:x}")))
            }
            "chainstack_unsubscribe" => {
                let sub = params[0].as_str().unwrap_or_default().to_string();
                self.unsubscribed.lock().unwrap().push(sub);
                ok(json!(true))
            }
            "emit" => {
                let note = notification(&params[0], params[1].clone());
                return Some((note.to_string(), ok(json!(true))));
            }
            "silent" => return None,
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("unknown method {other}")}
            }),
        };
        Some((String::new(), reply))
    }
}

pub fn notification(subscription: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "chainstack_subscription",
        "params": {"subscription": subscription, "result": result}
    })
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
