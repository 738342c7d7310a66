//! Chrome DevTools Protocol transport.
//!
//! A thin JSON-RPC client over the browser's DevTools WebSocket endpoint:
//! commands are matched to replies by id, protocol events are logged and
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use vidwatch_core::WatchError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// One WebSocket connection to a browser's DevTools endpoint.
pub struct CdpConnection {
    sink: Mutex<WsSink>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    /// Attach to the DevTools endpoint and start the reply reader.
    pub async fn connect(ws_url: &str) -> Result<Self, WatchError> {
        debug!(%ws_url, "connecting to devtools websocket");
        let (stream, _response) = connect_async(ws_url)
            .await
            .map_err(|e| WatchError::DriverCrashed(format!("devtools connect: {e}")))?;
        let (sink, mut source) = stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let pending_reader = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            warn!("unparseable devtools frame");
                            continue;
                        };
                        match value.get("id").and_then(Value::as_u64) {
                            Some(id) => {
                                if let Some(tx) = pending_reader.lock().await.remove(&id) {
                                    let _ = tx.send(value);
                                }
                            }
                            // Protocol event, not a command reply.
                            None => {
                                let method =
                                    value.get("method").and_then(serde_json::Value::as_str);
                                trace!(method, "devtools event");
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Dropping the map wakes every in-flight call with a recv error.
            pending_reader.lock().await.clear();
        });

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(0),
            reader,
        })
    }

    /// Send a command and await its reply, bounded by `timeout`.
    ///
    /// A deadline maps to [`WatchError::NavigationTimeout`] (the one CDP
    /// command the controller path bounds this way is `Page.navigate`;
    /// callers issuing other commands re-map as needed). A protocol-level
    /// error reply or a dead transport maps to
    /// [`WatchError::DriverCrashed`].
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, WatchError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut payload = json!({ "id": id, "method": method, "params": params });
        if let Some(sid) = session_id {
            payload["sessionId"] = json!(sid);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        trace!(%method, id, "sending devtools command");
        let send_result = self
            .sink
            .lock()
            .await
            .send(Message::Text(payload.to_string().into()))
            .await;
        if let Err(e) = send_result {
            self.pending.lock().await.remove(&id);
            return Err(WatchError::DriverCrashed(format!("devtools send: {e}")));
        }

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(WatchError::DriverCrashed(
                    "devtools connection closed mid-command".into(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(WatchError::NavigationTimeout(format!(
                    "{method} did not complete within {timeout:?}"
                )));
            }
        };

        if let Some(error) = reply.get("error") {
            return Err(WatchError::DriverCrashed(format!(
                "{method} failed: {error}"
            )));
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Best-effort close of the underlying socket.
    pub async fn shutdown(&self) {
        let _ = self.sink.lock().await.send(Message::Close(None)).await;
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
