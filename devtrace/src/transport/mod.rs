//! Duplex message channel to the remote debugging endpoint.
//!
//! One WebSocket connection carries JSON command/response pairs and
//! unsolicited event frames. A spawned reader task demultiplexes them:
//! frames with an `id` resolve the matching in-flight command, frames
//! with a `method` fan out to every live subscriber of that method.
//! Event frames are stamped with an arrival sequence number so the
//! aggregator can tell which chunks the endpoint delivered before the
//! completion notice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::domain::{SessionId, TransportError};

/// How long a command may wait for its response before the run fails.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

type PendingMap = Arc<Mutex<HashMap<u64, (String, oneshot::Sender<Result<Value, TransportError>>)>>>;
type SubscriberMap = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<EventFrame>>>>>;

/// One unsolicited event frame, as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct EventFrame {
    /// Arrival order across all event kinds on this connection.
    pub seq: u64,
    pub method: String,
    pub session_id: Option<SessionId>,
    pub params: Value,
}

impl EventFrame {
    /// Whether this frame belongs to the given session.
    pub fn is_for(&self, session: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session)
    }
}

/// A live connection to the debugging endpoint.
pub struct Transport {
    sink: Mutex<WsSink>,
    pending: PendingMap,
    subscribers: SubscriberMap,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl Transport {
    /// Open the WebSocket and start the demultiplexing reader.
    pub async fn connect(uri: &str) -> Result<Self, TransportError> {
        let (ws, _response) = connect_async(uri)
            .await
            .map_err(|source| TransportError::Connect { uri: uri.to_string(), source })?;
        debug!("connected to {uri}");

        let (sink, stream) = ws.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let reader =
            tokio::spawn(read_loop(stream, Arc::clone(&pending), Arc::clone(&subscribers)));

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Issue one command and wait for its response.
    ///
    /// With `session` set, the command executes inside that bound
    /// session; without it, it addresses the endpoint itself.
    pub async fn execute(
        &self,
        method: &str,
        params: Value,
        session: Option<&SessionId>,
    ) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut command = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session {
            command["sessionId"] = Value::String(session.0.clone());
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, (method.to_string(), tx));

        debug!("-> {method} (id {id})");
        if let Err(err) = self.sink.lock().await.send(Message::Text(command.to_string())).await {
            self.pending.lock().await.remove(&id);
            return Err(TransportError::Closed {
                method: method.to_string(),
                detail: err.to_string(),
            });
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Reader gone: the connection dropped under us.
            Ok(Err(_)) => Err(TransportError::Closed {
                method: method.to_string(),
                detail: "connection closed before the response arrived".to_string(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::ResponseTimeout {
                    method: method.to_string(),
                    timeout: COMMAND_TIMEOUT,
                })
            }
        }
    }

    /// Subscribe to every future event frame with this method name.
    ///
    /// Subscriptions live until the receiver is dropped or the
    /// connection closes.
    pub async fn subscribe(&self, method: &str) -> mpsc::UnboundedReceiver<EventFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.entry(method.to_string()).or_default().push(tx);
        rx
    }

    /// Close the socket and stop the reader. Best effort.
    pub async fn close(&self) {
        if let Err(err) = self.sink.lock().await.close().await {
            debug!("websocket close failed: {err}");
        }
        self.reader.abort();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, pending: PendingMap, subscribers: SubscriberMap) {
    let mut event_seq: u64 = 0;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!("transport read failed: {err}");
                break;
            }
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!("dropping unparseable frame: {err}");
                continue;
            }
        };

        // Responses carry the id of the command they answer.
        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            if let Some((method, tx)) = pending.lock().await.remove(&id) {
                debug!("<- {method} (id {id})");
                let _ = tx.send(response_outcome(&method, value));
            }
            continue;
        }

        // Everything else is an unsolicited event.
        if let Some(method) = value.get("method").and_then(Value::as_str) {
            event_seq += 1;
            dispatch_event(&subscribers, method, event_seq, &value).await;
        }
    }

    // Connection gone: wake anything still waiting on a response and
    // end every subscription by dropping the senders.
    pending.lock().await.clear();
    subscribers.lock().await.clear();
}

fn response_outcome(method: &str, mut value: Value) -> Result<Value, TransportError> {
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown protocol error")
            .to_string();
        return Err(TransportError::Protocol { method: method.to_string(), message });
    }
    Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null))
}

async fn dispatch_event(subscribers: &SubscriberMap, method: &str, seq: u64, value: &Value) {
    let frame = EventFrame {
        seq,
        method: method.to_string(),
        session_id: value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(|id| SessionId(id.to_string())),
        params: value.get("params").cloned().unwrap_or(Value::Null),
    };

    let mut map = subscribers.lock().await;
    if let Some(list) = map.get_mut(method) {
        // Prune subscribers whose receiver went away.
        list.retain(|tx| tx.send(frame.clone()).is_ok());
    }
}
