//! End-to-end collector tests against an in-process fake DevTools
//! endpoint speaking just enough of the protocol: target listing,
//! attach/detach, tracing start/end, and the three event kinds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use devtrace::config::{CollectorConfig, RecordMode, TraceConfig};
use devtrace::orchestrator::Orchestrator;

const SESSION_ID: &str = "SESSION-1";

/// Scripted behavior of the fake endpoint.
#[derive(Clone)]
struct Endpoint {
    targets: Value,
    /// Data events sent after Tracing.end; outer index is the
    /// connection number, inner entries are one event payload each.
    data_per_connection: Vec<Vec<Value>>,
    send_completion: bool,
    /// Emit data and completion right after Tracing.start, without
    /// waiting for a stop request.
    complete_on_start: bool,
    /// Reject Tracing.start as if another client were tracing.
    reject_start: bool,
    connections: Arc<AtomicUsize>,
    methods_seen: Arc<Mutex<Vec<String>>>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            targets: json!([
                { "targetId": "T1", "type": "page", "title": "demo", "url": "https://example.test" },
                { "targetId": "W1", "type": "worker", "title": "", "url": "" },
            ]),
            data_per_connection: Vec::new(),
            send_completion: true,
            complete_on_start: false,
            reject_start: false,
            connections: Arc::new(AtomicUsize::new(0)),
            methods_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn saw_method(&self, method: &str) -> bool {
        self.methods_seen.lock().expect("lock").iter().any(|m| m == method)
    }

    /// Bind on an ephemeral port and serve connections until dropped.
    async fn spawn(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let endpoint = self;
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let conn_index = endpoint.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, endpoint.clone(), conn_index));
            }
        });
        format!("ws://{addr}")
    }
}

async fn serve_connection(stream: TcpStream, endpoint: Endpoint, conn_index: usize) {
    let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let cmd: Value = serde_json::from_str(&text).expect("command json");
        let id = cmd["id"].as_u64().expect("command id");
        let method = cmd["method"].as_str().expect("command method").to_string();
        endpoint.methods_seen.lock().expect("lock").push(method.clone());

        match method.as_str() {
            "Target.getTargets" => {
                reply(&mut ws, id, json!({ "targetInfos": endpoint.targets })).await;
            }
            "Target.attachToTarget" => {
                reply(&mut ws, id, json!({ "sessionId": SESSION_ID })).await;
            }
            "Tracing.start" => {
                if endpoint.reject_start {
                    send(
                        &mut ws,
                        json!({
                            "id": id,
                            "error": { "code": -32000, "message": "Tracing is already started" }
                        }),
                    )
                    .await;
                    continue;
                }
                reply(&mut ws, id, json!({})).await;
                event(
                    &mut ws,
                    "Tracing.bufferUsage",
                    json!({ "percentFull": 0.05, "eventCount": 12.0, "value": 0.05 }),
                )
                .await;
                if endpoint.complete_on_start {
                    flush_trace(&mut ws, &endpoint, conn_index).await;
                }
            }
            "Tracing.end" => {
                reply(&mut ws, id, json!({})).await;
                if !endpoint.complete_on_start {
                    flush_trace(&mut ws, &endpoint, conn_index).await;
                }
            }
            _ => reply(&mut ws, id, json!({})).await,
        }
    }
}

type Ws = tokio_tungstenite::WebSocketStream<TcpStream>;

async fn flush_trace(ws: &mut Ws, endpoint: &Endpoint, conn_index: usize) {
    if let Some(events) = endpoint.data_per_connection.get(conn_index) {
        for value in events {
            event(ws, "Tracing.dataCollected", json!({ "value": value })).await;
        }
    }
    if endpoint.send_completion {
        event(ws, "Tracing.tracingComplete", json!({ "dataLossOccurred": false })).await;
    }
}

async fn reply(ws: &mut Ws, id: u64, result: Value) {
    send(ws, json!({ "id": id, "result": result })).await;
}

async fn event(ws: &mut Ws, method: &str, params: Value) {
    send(ws, json!({ "method": method, "sessionId": SESSION_ID, "params": params })).await;
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string())).await.expect("send frame");
}

fn config(endpoint: String, output: String, runs: usize) -> CollectorConfig {
    CollectorConfig {
        endpoint,
        output,
        trace: TraceConfig {
            record_mode: RecordMode::Continuously,
            enable_sampling: true,
            included_categories: vec!["devtools.timeline".to_string()],
        },
        runs,
        duration: Duration::from_millis(150),
        inter_run_delay: Duration::from_millis(50),
        buffer_usage_interval: Duration::from_millis(500),
        stop_grace: Duration::from_secs(2),
        legacy_fixups: false,
    }
}

#[tokio::test]
async fn test_single_run_collects_one_document() {
    let mut endpoint = Endpoint::new();
    endpoint.data_per_connection = vec![vec![json!([{ "a": 1 }])]];
    let probe = endpoint.clone();
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trace.json");
    let summary =
        Orchestrator::new(config(uri, output.to_string_lossy().into_owned(), 1)).run_batch().await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);

    let text = std::fs::read_to_string(&output).expect("document written");
    let parsed: Value = serde_json::from_str(&text).expect("parseable document");
    assert_eq!(parsed, json!([{ "a": 1 }, {}]));
    assert!(probe.saw_method("Target.detachFromTarget"));
}

#[tokio::test]
async fn test_run_without_data_events_writes_the_degenerate_document() {
    // No data events at all: the document is still a parseable array.
    let endpoint = Endpoint::new();
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trace.json");
    let summary =
        Orchestrator::new(config(uri, output.to_string_lossy().into_owned(), 1)).run_batch().await;

    assert_eq!(summary.completed, 1);
    let text = std::fs::read_to_string(&output).expect("document written");
    assert_eq!(text, "[{ }]");
    let parsed: Value = serde_json::from_str(&text).expect("parseable document");
    assert_eq!(parsed, json!([{}]));
}

#[tokio::test]
async fn test_missing_completion_fails_the_run_and_batch_proceeds() {
    let mut endpoint = Endpoint::new();
    endpoint.send_completion = false;
    let probe = endpoint.clone();
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trace.json");
    let mut config = config(uri, output.to_string_lossy().into_owned(), 2);
    config.stop_grace = Duration::from_millis(300);

    let summary = Orchestrator::new(config).run_batch().await;

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 2);
    // The first failure did not abort the batch.
    assert_eq!(probe.connections.load(Ordering::SeqCst), 2);
    // A failed run persists nothing.
    assert!(!output.exists());
    // Teardown still ran.
    assert!(probe.saw_method("Target.detachFromTarget"));
}

#[tokio::test]
async fn test_two_runs_produce_independent_documents() {
    let mut endpoint = Endpoint::new();
    endpoint.data_per_connection =
        vec![vec![json!([{ "run": 1 }])], vec![json!([{ "run": 2 }])]];
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("trace_{run}.json");
    let summary =
        Orchestrator::new(config(uri, template.to_string_lossy().into_owned(), 2)).run_batch().await;

    assert_eq!(summary.completed, 2);

    let first: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("trace_1.json")).expect("first document"),
    )
    .expect("parseable");
    let second: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("trace_2.json")).expect("second document"),
    )
    .expect("parseable");

    // No fragment from run 1 appears in run 2's document, and vice versa.
    assert_eq!(first, json!([{ "run": 1 }, {}]));
    assert_eq!(second, json!([{ "run": 2 }, {}]));
}

#[tokio::test]
async fn test_no_page_target_fails_before_attach() {
    let mut endpoint = Endpoint::new();
    endpoint.targets = json!([
        { "targetId": "W1", "type": "worker", "title": "", "url": "" },
    ]);
    let probe = endpoint.clone();
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trace.json");
    let summary =
        Orchestrator::new(config(uri, output.to_string_lossy().into_owned(), 1)).run_batch().await;

    assert_eq!(summary.failed, 1);
    // Selection failed, so no session was ever opened.
    assert!(!probe.saw_method("Target.attachToTarget"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_early_completion_ends_the_run_without_a_stop_request() {
    let mut endpoint = Endpoint::new();
    endpoint.complete_on_start = true;
    endpoint.data_per_connection = vec![vec![json!([{ "early": true }])]];
    let probe = endpoint.clone();
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trace.json");
    let mut config = config(uri, output.to_string_lossy().into_owned(), 1);
    // Far longer than the test should take: completion must cut it short.
    config.duration = Duration::from_secs(30);

    let summary = Orchestrator::new(config).run_batch().await;

    assert_eq!(summary.completed, 1);
    assert!(!probe.saw_method("Tracing.end"));

    let parsed: Value =
        serde_json::from_str(&std::fs::read_to_string(&output).expect("document")).expect("json");
    assert_eq!(parsed, json!([{ "early": true }, {}]));
}

#[tokio::test]
async fn test_rejected_start_fails_the_run_cleanly() {
    let mut endpoint = Endpoint::new();
    endpoint.reject_start = true;
    let probe = endpoint.clone();
    let uri = endpoint.spawn().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trace.json");
    let summary =
        Orchestrator::new(config(uri, output.to_string_lossy().into_owned(), 1)).run_batch().await;

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);
    // The aborted run still detached its session.
    assert!(probe.saw_method("Target.detachFromTarget"));
    assert!(!output.exists());
}
