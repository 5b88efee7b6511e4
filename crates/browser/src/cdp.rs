//! Minimal Chrome DevTools Protocol client over WebSocket.
//!
//! Commands are correlated to responses by an auto-incrementing id; events
//! fan out to subscriber channels. One connection drives one page target.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};
use webgrip_core::{Error, Result};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const OUTGOING_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 64;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type Listeners = Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>>;

pub struct CdpConnection {
    outgoing: mpsc::Sender<String>,
    pending: Pending,
    listeners: Listeners,
    next_id: AtomicU64,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::Browser(format!("CDP connect to {} failed: {}", ws_url, e)))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_BUFFER);

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    error!("CDP write failed: {}", e);
                    break;
                }
            }
        });

        let pending_reader = pending.clone();
        let listeners_reader = listeners.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let Ok(value) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
                            if let Some(tx) = pending_reader.lock().await.remove(&id) {
                                let _ = tx.send(value);
                            }
                        } else if let Some(method) =
                            value.get("method").and_then(|v| v.as_str())
                        {
                            let listeners = listeners_reader.lock().await;
                            if let Some(subscribers) = listeners.get(method) {
                                let params =
                                    value.get("params").cloned().unwrap_or(Value::Null);
                                for tx in subscribers {
                                    let _ = tx.try_send(params.clone());
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP connection closed by browser");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP read failed: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            outgoing,
            pending,
            listeners,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        })
    }

    /// Send a command and wait for its response's `result` payload.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({ "id": id, "method": method, "params": params });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.outgoing
            .send(message.to_string())
            .await
            .map_err(|_| Error::Browser("CDP connection is gone".to_string()))?;

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => {
                if let Some(err) = response.get("error") {
                    return Err(Error::Browser(format!("CDP {} failed: {}", method, err)));
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
            Ok(Err(_)) => Err(Error::Browser(format!(
                "CDP {} response channel closed",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Browser(format!(
                    "CDP {} timed out after {}s",
                    method,
                    COMMAND_TIMEOUT.as_secs()
                )))
            }
        }
    }

    /// Subscribe to a protocol event (e.g. "Network.responseReceived").
    pub async fn subscribe(&self, event: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.listeners
            .lock()
            .await
            .entry(event.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub async fn enable_domain(&self, domain: &str) -> Result<()> {
        self.call(&format!("{}.enable", domain), json!({})).await?;
        Ok(())
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
